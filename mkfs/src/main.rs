//! Formats a fresh WFS image: lays out the superblock, zeroes both
//! bitmaps, writes the root directory inode, and extends the file to its
//! full length.

use std::env;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::process::exit;

use wfs_core::layout::{self, Inode, Superblock};

/// Structure storing command line arguments.
#[derive(Default)]
struct Args {
    prog: String,
    device_path: Option<PathBuf>,
    num_inodes: Option<u64>,
    num_data_blocks: Option<u64>,
}

fn usage(prog: &str) -> ! {
    eprintln!("Usage: {prog} -d disk_img -i num_inodes -b num_data_blocks");
    exit(1);
}

fn parse_args() -> Args {
    let mut args: Args = Default::default();
    let mut iter = env::args();
    args.prog = iter.next().unwrap_or_else(|| "mkfs.wfs".to_owned());

    loop {
        let Some(flag) = iter.next() else { break };
        match flag.as_str() {
            "-d" => {
                args.device_path = Some(PathBuf::from(iter.next().unwrap_or_else(|| usage(&args.prog))));
            }
            "-i" => {
                let v = iter.next().unwrap_or_else(|| usage(&args.prog));
                args.num_inodes = v.parse().ok();
            }
            "-b" => {
                let v = iter.next().unwrap_or_else(|| usage(&args.prog));
                args.num_data_blocks = v.parse().ok();
            }
            "-h" | "--help" => usage(&args.prog),
            _ => usage(&args.prog),
        }
    }
    args
}

fn main() {
    let args = parse_args();

    let device_path = args.device_path.unwrap_or_else(|| usage(&args.prog));
    let num_inodes = match args.num_inodes {
        Some(n) if n > 0 => n,
        _ => usage(&args.prog),
    };
    let num_data_blocks = match args.num_data_blocks {
        Some(n) if n > 0 => n,
        _ => usage(&args.prog),
    };

    let num_inodes = layout::roundup(num_inodes, 32);
    let num_data_blocks = layout::roundup(num_data_blocks, 32);

    let i_bitmap_ptr = std::mem::size_of::<Superblock>() as u64;
    let d_bitmap_ptr = i_bitmap_ptr + layout::align_to_block(layout::ceil_division(num_inodes, 8));
    let i_blocks_ptr =
        d_bitmap_ptr + layout::align_to_block(layout::ceil_division(num_data_blocks, 8));
    let d_blocks_ptr = i_blocks_ptr + num_inodes * layout::INODE_STRIDE;

    let sb = Superblock {
        num_inodes,
        num_data_blocks,
        i_bitmap_ptr,
        d_bitmap_ptr,
        i_blocks_ptr,
        d_blocks_ptr,
    };

    let mut dev = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&device_path)
        .unwrap_or_else(|e| {
            eprintln!("{}: {}: {}", args.prog, device_path.display(), e);
            exit(1);
        });

    let write_all_at = |dev: &mut std::fs::File, off: u64, buf: &[u8]| -> std::io::Result<()> {
        dev.seek(SeekFrom::Start(off))?;
        dev.write_all(buf)
    };

    (|| -> std::io::Result<()> {
        dev.set_len(sb.image_len())?;

        write_all_at(&mut dev, 0, layout::as_bytes(&sb))?;

        // Bitmaps start zeroed by `set_len`'s implicit hole; write them
        // explicitly anyway so a pre-existing file of the right length
        // (re-formatting) still ends up zeroed.
        let zero_inode_bitmap = vec![0u8; sb.inode_bitmap_len() as usize];
        write_all_at(&mut dev, i_bitmap_ptr, &zero_inode_bitmap)?;
        let zero_data_bitmap = vec![0u8; sb.data_bitmap_len() as usize];
        write_all_at(&mut dev, d_bitmap_ptr, &zero_data_bitmap)?;

        let mut root = Inode::zeroed();
        root.mode = layout::S_IFDIR | 0o755;
        root.uid = unsafe { libc::getuid() };
        root.gid = unsafe { libc::getgid() };
        root.nlinks = 2;
        let now = wfs_core::inode::now();
        root.atim = now;
        root.mtim = now;
        root.ctim = now;
        write_all_at(&mut dev, i_blocks_ptr, layout::as_bytes(&root))?;

        dev.flush()
    })()
    .unwrap_or_else(|e| {
        eprintln!("{}: failed to format {}: {}", args.prog, device_path.display(), e);
        exit(1);
    });

    println!(
        "{}: formatted {} ({} inodes, {} data blocks, {} bytes)",
        args.prog,
        device_path.display(),
        num_inodes,
        num_data_blocks,
        sb.image_len(),
    );
}
