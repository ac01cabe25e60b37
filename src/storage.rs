//! 图片存储：目标目录准备、符号链接校验与防覆盖的文件创建。

use chrono::NaiveDateTime;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::ErrorKind;
use tracing::debug;

use crate::config::MAX_NAME_COLLISIONS;
use crate::paths::UploadDestination;

#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// 计算上传目标并确保小时目录存在（可并发重复调用）。
    pub async fn prepare_destination(
        &self,
        url_path: &str,
        timestamp: NaiveDateTime,
    ) -> Result<UploadDestination, StorageError> {
        let destination = UploadDestination::new(&self.root, url_path, timestamp)?;
        self.ensure_no_symlink_components(destination.directory())
            .await?;
        fs::create_dir_all(destination.directory()).await?;
        Ok(destination)
    }

    /// 以独占方式创建目标文件；重名时追加数字后缀，绝不覆盖已有文件。
    pub async fn create_upload_file(
        &self,
        destination: &UploadDestination,
    ) -> Result<(File, PathBuf), StorageError> {
        for attempt in 0..MAX_NAME_COLLISIONS {
            let path = destination.directory().join(destination.file_name(attempt));
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((file, path)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "upload file name taken");
                }
                Err(err) => return Err(StorageError::Io(err)),
            }
        }

        Err(StorageError::Io(io::Error::new(
            ErrorKind::AlreadyExists,
            "no free file name in upload directory",
        )))
    }

    async fn ensure_no_symlink_components(&self, target: &Path) -> Result<(), StorageError> {
        let relative = target
            .strip_prefix(&self.root)
            .map_err(|_| StorageError::InvalidPath)?;
        let mut current = PathBuf::from(&self.root);

        for component in relative.components() {
            current.push(component.as_os_str());
            match fs::symlink_metadata(&current).await {
                Ok(metadata) => {
                    if metadata.file_type().is_symlink() {
                        return Err(StorageError::InvalidPath);
                    }
                    if !metadata.is_dir() {
                        return Err(StorageError::Io(io::Error::new(
                            ErrorKind::NotADirectory,
                            format!("{} is not a directory", current.display()),
                        )));
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
                Err(err) => return Err(StorageError::Io(err)),
            }
        }

        Ok(())
    }
}

#[derive(Debug)]
pub enum StorageError {
    InvalidPath,
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}
