use crate::errors::Result;
use crate::model::SensorSample;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const WIND_HISTORY_KEY: &str = "windHistory";
pub const WIND_HISTORY_CAP: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindPoint {
    pub time: String,
    pub wind: Option<f64>,
}

impl From<&SensorSample> for WindPoint {
    fn from(sample: &SensorSample) -> Self {
        Self {
            time: sample.time.clone(),
            wind: sample.wind,
        }
    }
}

impl From<WindPoint> for SensorSample {
    fn from(point: WindPoint) -> Self {
        SensorSample {
            time: point.time,
            temperature: None,
            humidity: None,
            light: None,
            wind: point.wind,
        }
    }
}

/// Local copy of the wind chart, one JSON file under a fixed key.
#[derive(Debug, Clone)]
pub struct WindCache {
    path: PathBuf,
}

impl WindCache {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", WIND_HISTORY_KEY)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the cached points, newest last. A missing file is an empty history.
    pub async fn load(&self) -> Result<Vec<WindPoint>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut points: Vec<WindPoint> = serde_json::from_slice(&bytes)?;
        if points.len() > WIND_HISTORY_CAP {
            points.drain(..points.len() - WIND_HISTORY_CAP);
        }
        debug!("Loaded {} wind points from {}", points.len(), self.path.display());
        Ok(points)
    }

    /// Writes the newest [`WIND_HISTORY_CAP`] samples, replacing the file atomically.
    pub async fn store(&self, samples: &[SensorSample]) -> Result<()> {
        let skip = samples.len().saturating_sub(WIND_HISTORY_CAP);
        let points: Vec<WindPoint> = samples[skip..].iter().map(WindPoint::from).collect();
        let payload = serde_json::to_vec(&points)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, payload).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
