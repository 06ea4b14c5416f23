//! Streaming upload form
//!
//! The file is read by a background task that pushes pieces into a
//! bounded channel. The receiving end becomes the file part of a reqwest
//! multipart form, so at most `PIPE_DEPTH` pieces of `READ_BUF_SIZE` bytes
//! are in memory at once, whatever the size of the file.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::channel::mpsc;
use futures::SinkExt;
use reqwest::multipart::{Form, Part};
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;

use super::{Destination, ForwardOptions};

/// Pieces buffered between producer and consumer
pub const PIPE_DEPTH: usize = 8;

/// Size of each file read
pub const READ_BUF_SIZE: usize = 64 * 1024;

pub type BodyReceiver = mpsc::Receiver<Result<Bytes, io::Error>>;

/// Start a task streaming the file at `path` into a bounded channel.
///
/// A read error is sent down the channel before the task exits, so the
/// consumer sees a failed stream instead of a short body. The task stops
/// with `BrokenPipe` once the receiver is dropped.
pub fn spawn_file_stream(path: PathBuf) -> (BodyReceiver, JoinHandle<io::Result<()>>) {
    let (tx, rx) = mpsc::channel(PIPE_DEPTH);
    let handle = tokio::spawn(async move {
        let mut tx = tx;
        match produce(&path, &mut tx).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let kind = e.kind();
                let message = e.to_string();
                let _ = tx.send(Err(e)).await;
                Err(io::Error::new(kind, message))
            }
        }
    });
    (rx, handle)
}

async fn produce(
    path: &Path,
    tx: &mut mpsc::Sender<Result<Bytes, io::Error>>,
) -> io::Result<()> {
    let mut file = tokio::fs::File::open(path).await.map_err(|e| {
        io::Error::new(e.kind(), format!("failed to open file for streaming: {}", e))
    })?;

    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let n = file.read(&mut buf).await.map_err(|e| {
            io::Error::new(e.kind(), format!("failed to stream file content: {}", e))
        })?;
        if n == 0 {
            return Ok(());
        }
        tx.send(Ok(Bytes::copy_from_slice(&buf[..n])))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "request body receiver dropped"))?;
    }
}

/// Build the upload form for `destination`: its extra text fields in
/// order, then the streamed file part.
pub fn build_form(
    destination: Destination,
    filename: &str,
    options: &ForwardOptions,
    body: BodyReceiver,
) -> Result<Form, reqwest::Error> {
    let mime = mime_guess::from_path(filename).first_or_octet_stream();
    let file_part = Part::stream(reqwest::Body::wrap_stream(body))
        .file_name(filename.to_string())
        .mime_str(mime.essence_str())?;

    let form = destination
        .extra_fields(options)
        .into_iter()
        .fold(Form::new(), |form, (name, value)| form.text(name, value));

    Ok(form.part(destination.file_field(), file_part))
}
