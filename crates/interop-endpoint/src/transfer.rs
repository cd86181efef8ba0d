//! Out-of-band file transfers keyed by upload token.
//!
//! The uploading side registers a file and hands the token to its peer. The
//! peer asks for the file with a `DataDownloadRequest`; the token is consumed
//! while the transfer runs and restored if it fails, so a retry can find it.

use crate::dispatch::ProcessAction;
use crate::error::{ActionError, TransferError};
use crate::gateway::MessageGateway;
use async_trait::async_trait;
use interop_core::{EndpointId, Message, MessageBody, MessageKind, UploadToken};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct UploadTokenRegistry {
    uploads: Mutex<HashMap<UploadToken, PathBuf>>,
}

impl UploadTokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer `path` for download under a fresh token.
    pub fn register(&self, path: impl Into<PathBuf>) -> UploadToken {
        let token = UploadToken::new();
        let path = path.into();
        tracing::debug!("upload {} registered for {}", token, path.display());
        self.uploads.lock().insert(token, path);
        token
    }

    pub fn has_registration(&self, token: &UploadToken) -> bool {
        self.uploads.lock().contains_key(token)
    }

    pub fn deregister(&self, token: &UploadToken) -> Option<PathBuf> {
        self.uploads.lock().remove(token)
    }

    /// Put back a token taken by [`deregister`](Self::deregister).
    pub fn reregister(&self, token: UploadToken, path: PathBuf) {
        self.uploads.lock().insert(token, path);
    }

    pub fn len(&self) -> usize {
        self.uploads.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.uploads.lock().is_empty()
    }
}

/// Moves one registered file to a remote endpoint.
#[async_trait]
pub trait DataTransfer: Send + Sync {
    async fn transfer(
        &self,
        endpoint: &EndpointId,
        path: &Path,
        cancel: CancellationToken,
    ) -> Result<(), TransferError>;
}

/// Copies files into `<root>/<endpoint>/<file name>`.
///
/// Stands in for a real data channel when both endpoints share a file system.
#[derive(Debug, Clone)]
pub struct DirectoryTransfer {
    root: PathBuf,
}

impl DirectoryTransfer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Where a file sent to `endpoint` ends up.
    pub fn destination(&self, endpoint: &EndpointId, path: &Path) -> Option<PathBuf> {
        Some(self.root.join(endpoint.as_str()).join(path.file_name()?))
    }
}

#[async_trait]
impl DataTransfer for DirectoryTransfer {
    async fn transfer(
        &self,
        endpoint: &EndpointId,
        path: &Path,
        cancel: CancellationToken,
    ) -> Result<(), TransferError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| TransferError::Io { path, source }
        };
        let target = self.destination(endpoint, path).ok_or_else(|| TransferError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a file path"),
        })?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err(parent))?;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            copied = tokio::fs::copy(path, &target) => {
                let bytes = copied.map_err(io_err(path))?;
                tracing::debug!("copied {} bytes to {}", bytes, target.display());
                Ok(())
            }
        }
    }
}

/// Serves `DataDownloadRequest`s from the upload registry.
pub struct DataDownloadAction {
    uploads: Arc<UploadTokenRegistry>,
    transfer: Arc<dyn DataTransfer>,
    cancel: CancellationToken,
}

impl DataDownloadAction {
    /// Transfers get child tokens of `cancel`.
    pub fn new(
        uploads: Arc<UploadTokenRegistry>,
        transfer: Arc<dyn DataTransfer>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            uploads,
            transfer,
            cancel,
        }
    }
}

#[async_trait]
impl ProcessAction for DataDownloadAction {
    fn kind(&self) -> MessageKind {
        MessageKind::DataDownloadRequest
    }

    async fn process(
        &self,
        message: &Message,
        gateway: &MessageGateway,
    ) -> Result<(), ActionError> {
        let MessageBody::DataDownloadRequest { token } = &message.body else {
            return Err(ActionError::handler("not a download request"));
        };
        let path = self
            .uploads
            .deregister(token)
            .ok_or(TransferError::UnknownToken(*token))?;

        tracing::info!("sending {} to {}", path.display(), message.sender);
        let result = self
            .transfer
            .transfer(&message.sender, &path, self.cancel.child_token())
            .await;
        if let Err(e) = result {
            self.uploads.reregister(*token, path);
            return Err(e.into());
        }
        gateway.reply(message, MessageBody::Success).await?;
        Ok(())
    }
}

/// Ask `from` to send the upload behind `token`, waiting for the outcome.
pub async fn request_download(
    gateway: &MessageGateway,
    from: &EndpointId,
    token: UploadToken,
) -> Result<(), TransferError> {
    let reply = gateway
        .send_and_await_response(from, MessageBody::DataDownloadRequest { token })
        .await?;
    match reply.body {
        MessageBody::Success => Ok(()),
        other => Err(TransferError::Rejected {
            token,
            kind: other.kind(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Dispatched, MessageDispatcher};
    use crate::gateway::testing::{RecordingTransport, gateway};

    struct FailingTransfer;

    #[async_trait]
    impl DataTransfer for FailingTransfer {
        async fn transfer(
            &self,
            _endpoint: &EndpointId,
            path: &Path,
            _cancel: CancellationToken,
        ) -> Result<(), TransferError> {
            Err(TransferError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::other("disk on fire"),
            })
        }
    }

    fn download(token: UploadToken) -> Message {
        Message::new(EndpointId::named("beta"), MessageBody::DataDownloadRequest { token })
    }

    #[tokio::test]
    async fn download_copies_and_consumes_token() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("report.txt");
        std::fs::write(&source, "quarterly numbers").unwrap();
        let inbox = dir.path().join("inbox");

        let uploads = Arc::new(UploadTokenRegistry::new());
        let token = uploads.register(&source);
        assert!(uploads.has_registration(&token));

        let (transport, mut sent) = RecordingTransport::new();
        let dispatcher = MessageDispatcher::new(gateway(transport));
        dispatcher
            .register(Arc::new(DataDownloadAction::new(
                uploads.clone(),
                Arc::new(DirectoryTransfer::new(&inbox)),
                CancellationToken::new(),
            )))
            .unwrap();

        assert_eq!(dispatcher.dispatch(download(token)).await, Dispatched::Processed);
        assert_eq!(sent.recv().await.unwrap().1.kind(), MessageKind::Success);
        let copied = std::fs::read_to_string(inbox.join("beta").join("report.txt")).unwrap();
        assert_eq!(copied, "quarterly numbers");
        assert!(!uploads.has_registration(&token));

        assert_eq!(dispatcher.dispatch(download(token)).await, Dispatched::Failed);
        assert_eq!(sent.recv().await.unwrap().1.kind(), MessageKind::Failure);
    }

    #[tokio::test]
    async fn failed_transfer_restores_token() {
        let uploads = Arc::new(UploadTokenRegistry::new());
        let token = uploads.register("/nowhere/file.bin");
        let (transport, mut sent) = RecordingTransport::new();
        let dispatcher = MessageDispatcher::new(gateway(transport));
        dispatcher
            .register(Arc::new(DataDownloadAction::new(
                uploads.clone(),
                Arc::new(FailingTransfer),
                CancellationToken::new(),
            )))
            .unwrap();

        assert_eq!(dispatcher.dispatch(download(token)).await, Dispatched::Failed);
        assert_eq!(sent.recv().await.unwrap().1.kind(), MessageKind::Failure);
        assert_eq!(uploads.deregister(&token), Some(PathBuf::from("/nowhere/file.bin")));
    }

    #[tokio::test]
    async fn cancelled_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("big.bin");
        std::fs::write(&source, [0u8; 16]).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = DirectoryTransfer::new(dir.path().join("out"))
            .transfer(&EndpointId::named("beta"), &source, cancel)
            .await;
        assert!(matches!(result, Err(TransferError::Cancelled)));
    }

    #[tokio::test]
    async fn request_download_maps_replies() {
        let (transport, mut sent) = RecordingTransport::new();
        let gateway = gateway(transport);
        let alpha = EndpointId::named("alpha");
        let token = UploadToken::new();

        let requester = {
            let gateway = gateway.clone();
            let alpha = alpha.clone();
            tokio::spawn(async move { request_download(&gateway, &alpha, token).await })
        };
        let (_, request) = sent.recv().await.unwrap();
        assert!(matches!(
            request.body,
            MessageBody::DataDownloadRequest { token: t } if t == token
        ));
        gateway.try_complete(&Message::response(alpha.clone(), request.id, MessageBody::Failure));
        assert!(matches!(
            requester.await.unwrap(),
            Err(TransferError::Rejected { kind: MessageKind::Failure, .. })
        ));
    }
}
