use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::error::ConfigError;
use crate::pacing::Pacing;
use crate::samples::{SampleFiles, Sampling};

/// Per-session knobs. Only constructible with both factors inside `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tunables {
    busy_factor: f64,
    fail_factor: f64,
}

impl Tunables {
    pub fn new(busy_factor: f64, fail_factor: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&busy_factor) {
            return Err(ConfigError::BusyFactorOutOfRange(busy_factor));
        }
        if !(0.0..=1.0).contains(&fail_factor) {
            return Err(ConfigError::FailFactorOutOfRange(fail_factor));
        }

        Ok(Self {
            busy_factor,
            fail_factor,
        })
    }

    /// How often a session sends: higher is busier.
    pub fn busy_factor(&self) -> f64 {
        self.busy_factor
    }

    /// Reserved for fault injection. Carried through the run but not acted on yet.
    pub fn fail_factor(&self) -> f64 {
        self.fail_factor
    }
}

/// Simulates a population of SIP2 self-check terminals against a circulation server.
#[derive(Parser, Debug, Clone)]
#[command(name = "sipload", version, about, long_about = None)]
pub struct Args {
    /// SIP server address
    #[arg(short = 's', long = "server", default_value = "localhost:3333")]
    pub server: String,

    /// Number of SIP clients to create
    #[arg(short = 'n', long = "clients", default_value_t = 100)]
    pub clients: usize,

    /// Busyness factor (0-1)
    #[arg(short = 'b', long = "busy", default_value_t = 0.9, allow_negative_numbers = true)]
    pub busy_factor: f64,

    /// Failure factor (0-1), reserved
    #[arg(short = 'f', long = "fail", default_value_t = 0.0, allow_negative_numbers = true)]
    pub fail_factor: f64,

    /// File with valid barcodes (one per line)
    #[arg(long, default_value = "barcodes.txt")]
    pub barcodes: PathBuf,

    /// File with valid patron IDs (one per line)
    #[arg(long, default_value = "patrons.txt")]
    pub patrons: PathBuf,

    /// File with locations (one per line)
    #[arg(long, default_value = "branches.txt")]
    pub branches: PathBuf,

    /// CSV file with username,password. Sessions log in only when this is given
    #[arg(long = "sipusers")]
    pub credentials: Option<PathBuf>,

    /// Delay model between requests
    #[arg(long, value_enum, default_value_t = Pacing::ScaledUniform)]
    pub pacing: Pacing,

    /// Sample every pool entry, including the last one
    #[arg(long)]
    pub uniform_sampling: bool,

    /// Append AY/AZ error detection fields to requests
    #[arg(long)]
    pub checksum: bool,

    /// Run length in seconds. Runs until interrupted when omitted
    #[arg(short = 'd', long = "duration")]
    pub duration_secs: Option<u64>,
}

impl Args {
    pub fn tunables(&self) -> Result<Tunables, ConfigError> {
        Tunables::new(self.busy_factor, self.fail_factor)
    }

    pub fn sampling(&self) -> Sampling {
        if self.uniform_sampling {
            Sampling::Uniform
        } else {
            Sampling::Legacy
        }
    }

    pub fn sample_files(&self) -> SampleFiles<'_> {
        SampleFiles {
            barcodes: &self.barcodes,
            patrons: &self.patrons,
            branches: &self.branches,
            credentials: self.credentials.as_deref(),
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs.map(Duration::from_secs)
    }
}
