use std::future::Future;

use rn_common::client::ClientError;
use tokio::sync::Mutex;

use crate::error::SyncError;

/// Compares the local index with the remote tip. A remote tip behind the local index means
/// the remote lost data and is never retried
pub fn is_at_tip(local: Option<u64>, remote: Result<Option<u64>, SyncError>) -> Result<bool, SyncError> {
    let remote = match remote {
        Err(err) if err.is_not_found() => return Ok(true),
        remote => remote?,
    };

    match (local, remote) {
        (None, None) => Ok(true),
        (None, Some(_)) | (Some(_), None) => Ok(false),
        (Some(local), Some(remote)) if local > remote => {
            Err(SyncError::ShortRemoteTip { remote, local })
        }
        (Some(local), Some(remote)) => Ok(local == remote),
    }
}

/// Runs `step` until the index it reaches matches `tip`. Only one sync runs per `lock`
pub async fn sync_to_tip<S, SF, T, TF>(lock: &Mutex<()>, mut step: S, mut tip: T) -> Result<(), SyncError>
where
    S: FnMut() -> SF,
    SF: Future<Output = Result<Option<u64>, SyncError>>,
    T: FnMut() -> TF,
    TF: Future<Output = Result<Option<u64>, SyncError>>,
{
    let _guard = lock.lock().await;

    loop {
        let index = match step().await {
            Err(err) if err.is_not_found() => return Ok(()),
            index => index?,
        };

        if is_at_tip(index, tip().await)? {
            return Ok(());
        }
    }
}

/// Syncs `next..=latest` with `range` and returns the index reached locally
pub async fn sync_range<F, Fut>(
    latest: Result<Option<u64>, ClientError>,
    next: u64,
    range: F,
) -> Result<Option<u64>, SyncError>
where
    F: FnOnce(u64, u64) -> Fut,
    Fut: Future<Output = Result<(), SyncError>>,
{
    let latest = latest?.ok_or(SyncError::UndefinedLatest)?;

    if next > latest {
        return Ok(next.checked_sub(1));
    }

    range(next, latest).await?;
    Ok(Some(latest))
}
