//! Source file freshness.

use std::path::Path;

use time::OffsetDateTime;

/// Resolve the last-modified time of `path`.
///
/// Any stat failure (missing file, permission error, I/O fault) and any
/// platform without modification-time support degrades to "now". That is a
/// deliberate deny-cache-reuse policy, not error recovery left undone: an
/// unreadable source is treated as newer than anything cached, so the next
/// hit test fails and the handler runs. Nothing is surfaced to the caller.
pub async fn last_modified(path: &Path) -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata.modified().map(OffsetDateTime::from).unwrap_or(now),
        Err(_) => now,
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn existing_file_reports_its_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.ts");
        std::fs::write(&path, "export const x = 1").unwrap();

        let before = OffsetDateTime::now_utc();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let observed = last_modified(&path).await;
        // mtime of a file written before the call never lands in the future.
        assert!(observed <= OffsetDateTime::now_utc());
        assert!(observed >= before - time::Duration::seconds(60));
    }

    #[tokio::test]
    async fn missing_file_degrades_to_now() {
        let before = OffsetDateTime::now_utc();
        let observed = last_modified(Path::new("/nonexistent/brezza/app.ts")).await;
        let after = OffsetDateTime::now_utc();
        assert!(observed >= before);
        assert!(observed <= after);
    }

    #[tokio::test]
    async fn missing_file_is_never_older_than_an_existing_cache_stamp() {
        // The "now" fallback must compare as fresher than any mtime stamped
        // in the past, which is what forces the miss.
        let stamped = OffsetDateTime::now_utc() - time::Duration::seconds(5);
        let observed = last_modified(Path::new("/nonexistent/brezza/app.ts")).await;
        assert!(observed > stamped);
    }
}
