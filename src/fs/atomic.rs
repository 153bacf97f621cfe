//! 原子写入：先写同目录下的临时文件，成功后再 rename 覆盖目标。
//!
//! 写入中途失败时目标文件保持原样，临时文件被删除。
//! 目标已存在时临时文件沿用它的权限；新文件在 Unix 上只对所有者可读写。

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

static SAVE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// 新建数据库文件的权限
#[cfg(unix)]
const NEW_FILE_MODE: u32 = 0o600;

/// 原子写文件。
///
/// 1. 在目标目录创建临时文件，复制目标现有的权限；
/// 2. 调用 `write_fn` 写入完整内容并 fsync；
/// 3. rename 到目标路径（已存在时直接替换）。
pub fn write_atomic<F>(target: &Path, write_fn: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        Some(_) => Path::new("."),
        None => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "target path has no parent directory",
            ));
        }
    };

    fs::create_dir_all(parent)?;

    let tmp_path = save_path(parent, target.file_name());
    let mut tmp_file = create_tmp(&tmp_path)?;

    let written = copy_permissions(target, &tmp_file)
        .and_then(|()| write_fn(&mut tmp_file))
        .and_then(|()| tmp_file.sync_all());
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    drop(tmp_file);

    if let Err(err) = fs::rename(&tmp_path, target) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }

    debug!(path = %target.display(), "replaced file atomically");
    Ok(())
}

/// 原子写入一段完整字节
pub fn write_bytes_atomic(target: &Path, bytes: &[u8]) -> io::Result<()> {
    write_atomic(target, |file| file.write_all(bytes))
}

/// 同目录下的 `.<name>.saving-<pid>-<n>`
fn save_path(parent: &Path, file_name: Option<&std::ffi::OsStr>) -> PathBuf {
    let base_name = file_name
        .and_then(|n| n.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("database.kdbx");
    let counter = SAVE_COUNTER.fetch_add(1, Ordering::Relaxed);

    parent.join(format!(".{base_name}.saving-{}-{counter}", std::process::id()))
}

fn create_tmp(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(NEW_FILE_MODE);
    }
    options.open(path)
}

fn copy_permissions(target: &Path, tmp_file: &File) -> io::Result<()> {
    match fs::metadata(target) {
        Ok(meta) => tmp_file.set_permissions(meta.permissions()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
