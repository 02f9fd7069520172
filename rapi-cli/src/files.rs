//! File transfer commands: get, put.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rapi::CallContext;
use rapi::ops::{CREATE_ALWAYS, FILE_ATTRIBUTE_NORMAL, GENERIC_READ, GENERIC_WRITE, OPEN_EXISTING};

use crate::human_size;

/// Bytes moved per remote call.
const CHUNK: u32 = 64 * 1024;

/// Arguments for `rapi get`.
#[derive(clap::Args)]
pub struct GetArgs {
    /// Device path, e.g. `\My Documents\notes.txt`.
    pub remote: String,

    /// Local destination (default: the remote file name).
    pub local: Option<PathBuf>,
}

/// Arguments for `rapi put`.
#[derive(clap::Args)]
pub struct PutArgs {
    /// Local file.
    pub local: PathBuf,

    /// Device destination (default: `\My Documents\<name>`).
    pub remote: Option<String>,
}

pub fn get(ctx: &mut CallContext, args: &GetArgs) -> Result<()> {
    let local = match &args.local {
        Some(path) => path.clone(),
        None => PathBuf::from(remote_name(&args.remote)),
    };
    let handle = ctx
        .create_file(&args.remote, GENERIC_READ, 0, OPEN_EXISTING, FILE_ATTRIBUTE_NORMAL)
        .with_context(|| format!("cannot open {}", args.remote))?;
    let copied = download(ctx, handle, &local);
    ctx.close_handle(handle)?;
    let total = copied?;
    println!("{} -> {} ({})", args.remote, local.display(), human_size(total));
    Ok(())
}

fn download(ctx: &mut CallContext, handle: u32, local: &Path) -> Result<u64> {
    let mut file =
        File::create(local).with_context(|| format!("cannot create {}", local.display()))?;
    let mut total = 0u64;
    loop {
        let chunk = ctx.read_file(handle, CHUNK)?;
        if chunk.is_empty() {
            break;
        }
        file.write_all(&chunk)?;
        total += chunk.len() as u64;
    }
    file.flush()?;
    Ok(total)
}

pub fn put(ctx: &mut CallContext, args: &PutArgs) -> Result<()> {
    let remote = match &args.remote {
        Some(path) => path.clone(),
        None => {
            let name = args
                .local
                .file_name()
                .with_context(|| format!("{} has no file name", args.local.display()))?;
            format!("\\My Documents\\{}", name.to_string_lossy())
        }
    };
    let mut file = File::open(&args.local)
        .with_context(|| format!("cannot open {}", args.local.display()))?;
    let handle = ctx
        .create_file(&remote, GENERIC_WRITE, 0, CREATE_ALWAYS, FILE_ATTRIBUTE_NORMAL)
        .with_context(|| format!("cannot create {remote}"))?;
    let copied = upload(ctx, handle, &mut file);
    ctx.close_handle(handle)?;
    let total = copied?;
    println!("{} -> {remote} ({})", args.local.display(), human_size(total));
    Ok(())
}

fn upload(ctx: &mut CallContext, handle: u32, file: &mut File) -> Result<u64> {
    let mut buf = vec![0u8; CHUNK as usize];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        let written = ctx.write_file(handle, &buf[..n])?;
        if written as usize != n {
            bail!("short write: {written} of {n} bytes");
        }
        total += n as u64;
    }
    Ok(total)
}

/// Last component of a device path.
fn remote_name(path: &str) -> &str {
    path.rsplit('\\').next().unwrap_or(path)
}
