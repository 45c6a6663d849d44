//! Paced file replay source.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use super::{Source, SourceError};

/// Replays a domain file in small batches on a jittered cadence, simulating a
/// live feed for load and soak testing. With `repeat` the file wraps around
/// indefinitely; without it the source goes quiet after the last line.
pub struct StreamingFileSource {
    name: String,
    lines: Vec<String>,
    cursor: usize,
    ended: bool,
    delay: Duration,
    jitter: Duration,
    entries_per_produce: usize,
    entries_jitter: usize,
    repeat: bool,
    next_emit: Instant,
    rng: SmallRng,
}

impl StreamingFileSource {
    pub fn open(
        path: &str,
        delay: Duration,
        jitter: Duration,
        entries_per_produce: usize,
        entries_jitter: usize,
        repeat: bool,
    ) -> Result<Self, SourceError> {
        let content = std::fs::read_to_string(path).map_err(|source| SourceError::FileRead {
            path: path.to_string(),
            source,
        })?;

        let lines: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();

        info!(path = %path, domains = lines.len(), repeat, "Streaming replay file loaded");

        Ok(Self {
            name: format!("streaming_file:{path}"),
            ended: lines.is_empty(),
            lines,
            cursor: 0,
            delay,
            jitter,
            entries_per_produce,
            entries_jitter,
            repeat,
            next_emit: Instant::now(),
            rng: SmallRng::from_entropy(),
        })
    }

    fn batch_size(&mut self) -> usize {
        if self.entries_jitter == 0 {
            self.entries_per_produce
        } else {
            self.entries_per_produce + self.rng.gen_range(0..=self.entries_jitter)
        }
    }

    fn schedule_next(&mut self) {
        let jitter = if self.jitter.is_zero() {
            Duration::ZERO
        } else {
            Duration::from_millis(self.rng.gen_range(0..=self.jitter.as_millis() as u64))
        };
        self.next_emit = Instant::now() + self.delay + jitter;
    }
}

#[async_trait]
impl Source for StreamingFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(100)
    }

    async fn collect(&mut self) -> Result<Vec<String>, SourceError> {
        if self.ended || Instant::now() < self.next_emit {
            return Ok(Vec::new());
        }

        let mut batch = Vec::with_capacity(self.entries_per_produce);
        let wanted = self.batch_size();
        while batch.len() < wanted {
            if self.cursor >= self.lines.len() {
                if self.repeat {
                    self.cursor = 0;
                } else {
                    debug!(source = %self.name, "Replay file exhausted");
                    self.ended = true;
                    break;
                }
            }
            batch.push(self.lines[self.cursor].clone());
            self.cursor += 1;
        }

        self.schedule_next();
        Ok(batch)
    }
}
