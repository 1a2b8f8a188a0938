use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use log::info;
use rand::Rng;
use serde::Deserialize;

use crate::error::SampleError;

/// How an index is drawn from a pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Sampling {
    /// Index drawn from `[0, len - 1)`: the last entry is never picked. Kept so runs stay
    /// comparable with earlier baselines.
    #[default]
    Legacy,
    /// Index drawn from `[0, len)`.
    Uniform,
}

impl Sampling {
    fn min_len(self) -> usize {
        match self {
            Sampling::Legacy => 2,
            Sampling::Uniform => 1,
        }
    }

    fn upper_bound(self, len: usize) -> usize {
        match self {
            Sampling::Legacy => len - 1,
            Sampling::Uniform => len,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

/// Read-only list of values a session draws from. Construction guarantees that `pick` never
/// sees an empty range.
#[derive(Clone, Debug)]
pub struct SamplePool<T = String> {
    name: &'static str,
    values: Vec<T>,
    sampling: Sampling,
}

pub type CredentialPool = SamplePool<Credential>;

impl<T> SamplePool<T> {
    pub fn new(name: &'static str, values: Vec<T>, sampling: Sampling) -> Result<Self, SampleError> {
        if values.len() < sampling.min_len() {
            return Err(SampleError::TooSmall {
                name,
                len: values.len(),
                required: sampling.min_len(),
            });
        }

        Ok(Self {
            name,
            values,
            sampling,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn pick_index<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        rng.random_range(0..self.sampling.upper_bound(self.values.len()))
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &T {
        &self.values[self.pick_index(rng)]
    }
}

/// Everything sessions draw their request fields from. Built once, then shared behind an `Arc`.
#[derive(Clone, Debug)]
pub struct SamplePools {
    pub barcodes: SamplePool,
    pub patrons: SamplePool,
    pub branches: SamplePool,
    /// Present only when sessions have to log in.
    pub credentials: Option<CredentialPool>,
}

pub struct SampleFiles<'a> {
    pub barcodes: &'a Path,
    pub patrons: &'a Path,
    pub branches: &'a Path,
    pub credentials: Option<&'a Path>,
}

impl SamplePools {
    pub fn load(files: &SampleFiles<'_>, sampling: Sampling) -> Result<Self, SampleError> {
        let barcodes = SamplePool::new("barcodes", load_lines(files.barcodes)?, sampling)?;
        let patrons = SamplePool::new("patrons", load_lines(files.patrons)?, sampling)?;
        let branches = SamplePool::new("branches", load_lines(files.branches)?, sampling)?;

        let credentials = match files.credentials {
            Some(path) => Some(SamplePool::new(
                "credentials",
                load_credentials(path)?,
                sampling,
            )?),
            None => None,
        };

        info!(
            "Loaded {} barcodes, {} patrons, {} branches, {} credentials",
            barcodes.len(),
            patrons.len(),
            branches.len(),
            credentials.as_ref().map_or(0, |c| c.len())
        );

        Ok(Self {
            barcodes,
            patrons,
            branches,
            credentials,
        })
    }
}

/// One value per line. Empty lines are kept as empty values and nothing is trimmed besides the
/// line terminator. Bytes that are not valid UTF-8 are replaced rather than rejected.
pub fn load_lines(path: &Path) -> Result<Vec<String>, SampleError> {
    let io_err = |source| SampleError::Io {
        path: path.to_owned(),
        source,
    };

    let file = File::open(path).map_err(io_err)?;

    BufReader::new(file)
        .split(b'\n')
        .map(|line| {
            line.map(|mut bytes| {
                if bytes.last() == Some(&b'\r') {
                    bytes.pop();
                }
                String::from_utf8_lossy(&bytes).into_owned()
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)
}

/// `username,password` records without a header row.
pub fn load_credentials(path: &Path) -> Result<Vec<Credential>, SampleError> {
    let file = File::open(path).map_err(|source| SampleError::Io {
        path: path.to_owned(),
        source,
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut credentials = Vec::new();

    for record in reader.records() {
        let record = record.map_err(|source| SampleError::Csv {
            path: path.to_owned(),
            source,
        })?;

        if record.len() != 2 {
            return Err(SampleError::Format {
                path: path.to_owned(),
                line: record.position().map_or(0, |p| p.line()),
                fields: record.len(),
            });
        }

        let credential = record
            .deserialize::<Credential>(None)
            .map_err(|source| SampleError::Csv {
                path: path.to_owned(),
                source,
            })?;
        credentials.push(credential);
    }

    Ok(credentials)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rand::{rngs::SmallRng, SeedableRng};
    use tempfile::NamedTempFile;

    use super::*;

    fn temp_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn pool(len: usize, sampling: Sampling) -> SamplePool<usize> {
        SamplePool::new("test", (0..len).collect(), sampling).unwrap()
    }

    #[test]
    fn test_load_lines_keeps_blank_lines() {
        let file = temp_file("03010000001\n\n  03010000002 \r\n");
        let lines = load_lines(file.path()).unwrap();

        assert_eq!(lines, vec!["03010000001", "", "  03010000002 "]);
    }

    #[test]
    fn test_load_lines_accepts_invalid_utf8() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"0301\nN\xff12\n").unwrap();

        let lines = load_lines(file.path()).unwrap();

        assert_eq!(lines, vec!["0301".to_string(), "N\u{FFFD}12".to_string()]);
    }

    #[test]
    fn test_load_lines_missing_file() {
        let err = load_lines(Path::new("/nonexistent/barcodes.txt")).unwrap_err();

        assert!(matches!(err, SampleError::Io { .. }));
    }

    #[test]
    fn test_load_credentials() {
        let file = temp_file("autouser,secret\nselfcheck,pass\n");
        let creds = load_credentials(file.path()).unwrap();

        assert_eq!(
            creds,
            vec![
                Credential {
                    username: "autouser".into(),
                    password: "secret".into()
                },
                Credential {
                    username: "selfcheck".into(),
                    password: "pass".into()
                },
            ]
        );
    }

    #[test]
    fn test_load_credentials_rejects_wrong_field_count() {
        let file = temp_file("autouser,secret\nbroken\n");
        let err = load_credentials(file.path()).unwrap_err();

        match err {
            SampleError::Format { line, fields, .. } => {
                assert_eq!(line, 2);
                assert_eq!(fields, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_pool_too_small() {
        assert!(SamplePool::new("one", vec!["x".to_string()], Sampling::Legacy).is_err());
        assert!(SamplePool::<String>::new("none", vec![], Sampling::Uniform).is_err());
        assert!(SamplePool::new("one", vec!["x".to_string()], Sampling::Uniform).is_ok());
    }

    #[test]
    fn test_legacy_pick_never_returns_last() {
        let mut rng = SmallRng::seed_from_u64(7);

        for k in [2usize, 3, 5, 10] {
            let pool = pool(k, Sampling::Legacy);
            let mut seen = vec![false; k];

            for _ in 0..10_000 {
                seen[*pool.pick(&mut rng)] = true;
            }

            assert!(!seen[k - 1], "index {} drawn from pool of {}", k - 1, k);
            assert!(seen[..k - 1].iter().all(|s| *s));
        }
    }

    #[test]
    fn test_uniform_pick_reaches_every_index() {
        let mut rng = SmallRng::seed_from_u64(7);
        let pool = pool(4, Sampling::Uniform);
        let mut seen = [false; 4];

        for _ in 0..10_000 {
            seen[pool.pick_index(&mut rng)] = true;
        }

        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_load_pools() {
        let barcodes = temp_file("b1\nb2\nb3\n");
        let patrons = temp_file("p1\np2\n");
        let branches = temp_file("hutl\nfmaj\n");

        let files = SampleFiles {
            barcodes: barcodes.path(),
            patrons: patrons.path(),
            branches: branches.path(),
            credentials: None,
        };
        let pools = SamplePools::load(&files, Sampling::Legacy).unwrap();

        assert_eq!(pools.barcodes.len(), 3);
        assert_eq!(pools.patrons.name(), "patrons");
        assert!(pools.credentials.is_none());
    }
}
