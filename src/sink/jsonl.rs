// JSON-lines sink: one document per line to a file, or stdout for "-".

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use super::{Output, WriteSummary};

pub struct JsonLinesSink {
    out: BufWriter<Box<dyn AsyncWrite + Unpin + Send>>,
}

impl JsonLinesSink {
    pub async fn open(path: &str) -> anyhow::Result<Self> {
        let out: Box<dyn AsyncWrite + Unpin + Send> = if path == "-" {
            Box::new(tokio::io::stdout())
        } else {
            if let Some(parent) = std::path::Path::new(path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            Box::new(tokio::fs::File::create(path).await?)
        };
        Ok(Self {
            out: BufWriter::new(out),
        })
    }

    /// Point upserts are written whole (`filter`, `update`, `upsert`); nothing is
    /// merged here, so every line counts as an insert.
    pub async fn write(&mut self, batch: &[Output]) -> anyhow::Result<WriteSummary> {
        for item in batch {
            let line = match item {
                Output::Point(upsert) => serde_json::to_vec(upsert)?,
                Output::Bucket(doc) => serde_json::to_vec(doc)?,
            };
            self.out.write_all(&line).await?;
            self.out.write_all(b"\n").await?;
        }
        self.out.flush().await?;
        Ok(WriteSummary {
            inserted: batch.len() as u64,
            ..Default::default()
        })
    }

    pub async fn close(mut self) -> anyhow::Result<()> {
        self.out.shutdown().await?;
        Ok(())
    }
}
