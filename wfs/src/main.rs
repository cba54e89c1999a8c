//! `wfs`: mounts a WFS image as a userspace filesystem via FUSE.
//!
//! Usage: `wfs <image_path> [-o opt,opt,...] <mount_point>`. Recognized
//! `-o` options: `ro`, `rw`, `allow_other`, `allow_root`,
//! `default_permissions`, `auto_unmount`; anything else passes through
//! as a raw mount option unchanged.

mod host;

use fuser::MountOption;
use host::Host;
use std::env;
use std::path::PathBuf;
use std::process::exit;
use wfs_core::Mount;

struct Args {
    prog: String,
    image_path: Option<PathBuf>,
    mount_point: Option<PathBuf>,
    options: Vec<MountOption>,
}

fn usage(prog: &str) -> ! {
    eprintln!("Usage: {prog} <image_path> [-o opt,opt,...] <mount_point>");
    exit(1);
}

fn parse_options(csv: &str) -> Vec<MountOption> {
    csv.split(',')
        .filter(|s| !s.is_empty())
        .map(|opt| match opt {
            "ro" => MountOption::RO,
            "rw" => MountOption::RW,
            "allow_other" => MountOption::AllowOther,
            "allow_root" => MountOption::AllowRoot,
            "default_permissions" => MountOption::DefaultPermissions,
            "auto_unmount" => MountOption::AutoUnmount,
            other => MountOption::CUSTOM(other.to_string()),
        })
        .collect()
}

fn parse_args() -> Args {
    let mut iter = env::args();
    let prog = iter.next().unwrap_or_else(|| "wfs".to_owned());
    let mut positional = Vec::new();
    let mut options = Vec::new();

    while let Some(arg) = iter.next() {
        if arg == "-o" {
            let csv = iter.next().unwrap_or_else(|| usage(&prog));
            options.extend(parse_options(&csv));
        } else if arg == "-h" || arg == "--help" {
            usage(&prog);
        } else {
            positional.push(arg);
        }
    }

    if positional.len() != 2 {
        usage(&prog);
    }
    let mut positional = positional.into_iter();
    Args {
        image_path: Some(PathBuf::from(positional.next().unwrap())),
        mount_point: Some(PathBuf::from(positional.next().unwrap())),
        options,
        prog,
    }
}

fn main() {
    env_logger::init();
    let args = parse_args();

    let image_path = args.image_path.unwrap();
    let mount_point = args.mount_point.unwrap();

    let mount = Mount::open(&image_path).unwrap_or_else(|e| {
        eprintln!("{}: {}: {}", args.prog, image_path.display(), e);
        exit(1);
    });

    log::info!(
        "mounting {} at {}",
        image_path.display(),
        mount_point.display()
    );

    let mut options = args.options;
    options.push(MountOption::FSName("wfs".to_string()));

    if let Err(e) = fuser::mount2(Host::new(mount), &mount_point, &options) {
        log::error!("mount failed: {e}");
        eprintln!("{}: failed to mount {}: {}", args.prog, mount_point.display(), e);
        exit(1);
    }
}
