use hearth_model::Event;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

/// One spill file per overflow batch: newline-delimited JSON, one `Event`
/// per line (§6 "Persisted state"). File names embed a monotonic counter
/// so recovery can process them in submission order.
pub async fn write_spill_file(dir: &Path, sequence: u64, events: &[Event]) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir).await?;
    let path = dir.join(format!("overflow-{sequence:020}.ndjson"));
    let mut body = String::new();
    for event in events {
        match serde_json::to_string(event) {
            Ok(line) => {
                body.push_str(&line);
                body.push('\n');
            }
            Err(e) => warn!(error = %e, "failed to serialize event for spill, dropping it"),
        }
    }
    let mut file = fs::File::create(&path).await?;
    file.write_all(body.as_bytes()).await?;
    Ok(path)
}

/// Reads every spill file in `dir` back into events and deletes each file
/// once consumed (§6 "consumed and deleted on startup"). Files are
/// processed in filename order, which is submission order.
pub async fn recover_spill_dir(dir: &Path) -> std::io::Result<Vec<Event>> {
    let mut recovered = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(recovered),
        Err(e) => return Err(e),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        paths.push(entry.path());
    }
    paths.sort();

    for path in paths {
        let contents = fs::read_to_string(&path).await?;
        let mut line_count = 0;
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(line) {
                Ok(event) => {
                    recovered.push(event);
                    line_count += 1;
                }
                Err(e) => error!(error = %e, path = %path.display(), "dropping malformed spill record"),
            }
        }
        info!(path = %path.display(), recovered = line_count, "recovered spill file");
        fs::remove_file(&path).await?;
    }

    Ok(recovered)
}
