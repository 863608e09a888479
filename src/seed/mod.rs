//! Per-title seed retrieval.
//!
//! A seed is a 16-byte key some titles need before their content can be
//! decrypted. Seeds cached on the SD volume under `/fbi/seed/` take priority;
//! otherwise the seed is fetched from the title CDN for the console's region.

mod volume;

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info, instrument};

use crate::download::{DownloadError, HttpClient, NativeHttp, ReqwestStack};

pub use volume::{VolumeGuard, VolumeRegistry};

/// Size of a title seed in bytes.
pub const SEED_SIZE: usize = 16;

/// CDN that serves seeds.
pub const SEED_CDN: &str = "https://kagiya-ctr.cdn.nintendo.net";

/// Path of the cached seed for `title_id`, relative to the SD volume root.
///
/// ```
/// assert_eq!(
///     hbfetch_core::seed_path(0x0004_0000_0003_0800),
///     "/fbi/seed/0004000000030800.dat"
/// );
/// ```
#[must_use]
pub fn seed_path(title_id: u64) -> String {
    format!("/fbi/seed/{title_id:016X}.dat")
}

/// Seed URL for `title_id` on `base` (normally [`SEED_CDN`]).
#[must_use]
pub fn seed_url(base: &str, title_id: u64, region: Region) -> String {
    format!(
        "{}/title/0x{title_id:016X}/ext_key?country={}",
        base.trim_end_matches('/'),
        region.country_code()
    )
}

/// Console region, as reported by the system configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Japan,
    America,
    Europe,
    Australia,
    China,
    Korea,
    Taiwan,
}

impl Region {
    /// All regions, in region-code order.
    pub const ALL: [Self; 7] = [
        Self::Japan,
        Self::America,
        Self::Europe,
        Self::Australia,
        Self::China,
        Self::Korea,
        Self::Taiwan,
    ];

    /// Country the CDN expects for this region.
    #[must_use]
    pub fn country_code(self) -> &'static str {
        match self {
            Self::Japan => "JP",
            Self::America => "US",
            Self::Europe | Self::Australia => "GB",
            Self::China => "HK",
            Self::Korea => "KR",
            Self::Taiwan => "TW",
        }
    }

    /// Three-letter region name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Japan => "JPN",
            Self::America => "USA",
            Self::Europe => "EUR",
            Self::Australia => "AUS",
            Self::China => "CHN",
            Self::Korea => "KOR",
            Self::Taiwan => "TWN",
        }
    }

    /// Numeric region code.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Region {
    type Error = DownloadError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(usize::from(code))
            .copied()
            .ok_or_else(|| DownloadError::out_of_range(format!("region code {code}")))
    }
}

impl FromStr for Region {
    type Err = DownloadError;

    /// Accepts a region code (`0`..=`6`) or a three-letter name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<u8>() {
            return Self::try_from(code);
        }
        Self::ALL
            .into_iter()
            .find(|region| region.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| DownloadError::out_of_range(format!("region {s:?}")))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Looks up seeds on the SD volume, fetching missing ones from the CDN.
#[derive(Debug)]
pub struct SeedFetcher<'a, H: NativeHttp = ReqwestStack> {
    client: &'a HttpClient<H>,
    volumes: &'a VolumeRegistry,
    sd_root: PathBuf,
    base_url: String,
}

impl<'a, H: NativeHttp> SeedFetcher<'a, H> {
    /// Creates a fetcher reading cached seeds below `sd_root`.
    pub fn new(
        client: &'a HttpClient<H>,
        volumes: &'a VolumeRegistry,
        sd_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            volumes,
            sd_root: sd_root.into(),
            base_url: SEED_CDN.to_string(),
        }
    }

    /// Fetches from `base_url` instead of [`SEED_CDN`].
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Host path of the cached seed for `title_id`.
    #[must_use]
    pub fn local_path(&self, title_id: u64) -> PathBuf {
        self.sd_root
            .join(seed_path(title_id).trim_start_matches('/'))
    }

    /// Returns the seed for `title_id`.
    ///
    /// A cached seed file of at least [`SEED_SIZE`] bytes wins; otherwise
    /// the seed is downloaded for `region`.
    ///
    /// # Errors
    ///
    /// - `OutOfRange` for a region code above 6
    /// - `BadData` when the CDN answers with anything but 16 bytes
    /// - any download error
    #[instrument(skip(self), fields(title_id = %format_args!("{title_id:016X}")))]
    pub fn fetch(&self, title_id: u64, region: u8) -> Result<[u8; SEED_SIZE], DownloadError> {
        if let Some(seed) = self.cached(title_id) {
            info!("using cached seed");
            return Ok(seed);
        }

        let region = Region::try_from(region)?;
        let url = seed_url(&self.base_url, title_id, region);
        let mut seed = [0u8; SEED_SIZE];
        let size = self.client.download_to_buffer(&url, &mut seed)?;
        if size != SEED_SIZE {
            return Err(DownloadError::BadData {
                expected: SEED_SIZE,
                actual: size,
            });
        }
        info!(%region, "seed downloaded");
        Ok(seed)
    }

    /// Cached seed, if the SD volume opens and holds one.
    fn cached(&self, title_id: u64) -> Option<[u8; SEED_SIZE]> {
        match self.volumes.guard(&self.sd_root) {
            Ok(_volume) => read_cached(&self.local_path(title_id)),
            Err(error) => {
                debug!(root = %self.sd_root.display(), error = %error, "SD volume unavailable");
                None
            }
        }
    }
}

/// Reads a cached seed; any failure means "not cached".
fn read_cached(path: &Path) -> Option<[u8; SEED_SIZE]> {
    let mut seed = [0u8; SEED_SIZE];
    match std::fs::File::open(path).and_then(|mut file| file.read_exact(&mut seed)) {
        Ok(()) => Some(seed),
        Err(error) => {
            debug!(path = %path.display(), error = %error, "no usable cached seed");
            None
        }
    }
}
