//! Operations related to TAR archives

use std::{
    path::{Path, PathBuf},
    pin::Pin,
};

use bytes::{Bytes, BytesMut};
use futures::{Future, FutureExt, Stream};
use tokio::{io::AsyncWrite, task::JoinHandle};
use tokio_tar::{Builder, Header};

use crate::harness::SourceFiles;

/// Owner of every file placed into a sandbox; matches the `executor` user of
/// the sandbox images.
pub const SANDBOX_UID: u64 = 1001;

/// Pack generated source files into an in-memory tar archive.
///
/// The archive is byte-for-byte reproducible: entries follow the map's key
/// order, and timestamps are zeroed.
pub async fn build_archive(files: &SourceFiles) -> std::io::Result<Bytes> {
    let mut tar = Builder::new(Vec::new());
    for (name, contents) in files {
        let mut header = Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_uid(SANDBOX_UID);
        header.set_gid(SANDBOX_UID);
        header.set_mtime(0);
        tar.append_data(&mut header, name, contents.as_bytes())
            .await?;
    }
    let buf = tar.into_inner().await?;
    Ok(Bytes::from(buf))
}

/// Spawn a task to pack the given `path` into a Tar file.
///
/// Returns the tar file stream to read from and the join handle to the packing
/// task.
pub fn pack_dir(
    path: PathBuf,
) -> (
    impl Stream<Item = Result<BytesMut, std::io::Error>> + 'static,
    JoinHandle<Result<(), std::io::Error>>,
) {
    let (pipe_recv, pipe_send) = tokio::io::duplex(8192);
    let read_codec = tokio_util::codec::BytesCodec::new();
    let frame = tokio_util::codec::FramedRead::new(pipe_send, read_codec);

    let task = async move {
        let mut tar = Builder::new(pipe_recv);
        add_dir(&path, &path, &mut tar).await?;
        tar.finish().await?;
        Ok(())
    };
    (frame, tokio::spawn(task))
}

/// Recursively add the files under `dir` into `tar`, named relative to `root`.
fn add_dir<'a, W: AsyncWrite + Send + Sync + Unpin + 'static>(
    root: &'a Path,
    dir: &'a Path,
    tar: &'a mut Builder<W>,
) -> Pin<Box<dyn Future<Output = Result<(), std::io::Error>> + Send + 'a>> {
    async move {
        let mut read_dir = tokio::fs::read_dir(dir).await?;
        while let Some(next) = read_dir.next_entry().await? {
            let path = next.path();
            let meta = tokio::fs::metadata(&path).await?;

            if meta.is_dir() {
                add_dir(root, &path, tar).await?;
            } else if meta.is_file() {
                let name = path
                    .strip_prefix(root)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
                let mut file = tokio::fs::File::open(&path).await?;
                let mut header = Header::new_gnu();
                header.set_metadata(&meta);
                tar.append_data(&mut header, name, &mut file).await?;
            }
        }
        Ok(())
    }
    .boxed()
}
