//! Champion registry: id ↔ name mapping and lane-aptitude lookup.
//!
//! The registry is loaded once from an embedded data file so the agent works
//! offline. An optional refresh pulls the latest champion list from the
//! vendor CDN; the swap is atomic and readers always see a consistent
//! version. Embedded aptitude rows are authoritative — a refresh only adds
//! champions the embedded file does not know about, deriving their aptitude
//! from the CDN class tags.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::roles::Role;
use crate::{AppError, Result};

/// Vendor CDN serving champion data.
pub const DEFAULT_CDN: &str = "https://ddragon.leagueoflegends.com";

const EMBEDDED_DATA: &str = include_str!("../data/champions.json");

/// Numeric champion id as reported by the client.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    derive_more::Display,
    derive_more::From,
    derive_more::Into,
)]
pub struct ChampionId(pub u32);

/// Integer lane weights, higher = more typical for the champion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, Deserialize)]
pub struct LaneAptitude {
    pub top: u8,
    pub jungle: u8,
    pub middle: u8,
    pub bottom: u8,
    pub support: u8,
}

impl LaneAptitude {
    pub fn get(&self, role: Role) -> u8 {
        match role {
            Role::Top => self.top,
            Role::Jungle => self.jungle,
            Role::Middle => self.middle,
            Role::Bottom => self.bottom,
            Role::Support => self.support,
            Role::Unknown => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Champion {
    pub id: ChampionId,
    /// URL-safe name as produced by [`normalise`].
    pub canonical_name: String,
    pub display_names: HashMap<String, String>,
    pub lane_aptitude: LaneAptitude,
}

impl Champion {
    /// Localised display name, falling back to `en_US` then the canonical name.
    pub fn display_name(&self, locale: &str) -> &str {
        self.display_names
            .get(locale)
            .or_else(|| self.display_names.get("en_US"))
            .map(String::as_str)
            .unwrap_or(&self.canonical_name)
    }
}

/// One consistent version of the registry. Readers hold an `Arc` to it and
/// are unaffected by concurrent refreshes.
#[derive(Debug, Clone)]
pub struct RegistryData {
    pub version: String,
    by_id: HashMap<ChampionId, Champion>,
}

impl RegistryData {
    pub fn champion(&self, id: ChampionId) -> Option<&Champion> {
        self.by_id.get(&id)
    }

    pub fn canonical_name(&self, id: ChampionId) -> Option<&str> {
        self.by_id.get(&id).map(|c| c.canonical_name.as_str())
    }

    pub fn aptitude(&self, id: ChampionId) -> Option<&LaneAptitude> {
        self.by_id.get(&id).map(|c| &c.lane_aptitude)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Copy-on-write champion registry.
pub struct ChampionRegistry {
    inner: RwLock<Arc<RegistryData>>,
}

impl ChampionRegistry {
    /// Load the registry from the data file packaged with the binary.
    pub fn embedded() -> Result<Self> {
        let data = parse_embedded(EMBEDDED_DATA)?;
        info!(
            version = %data.version,
            champions = data.by_id.len(),
            "champion registry loaded from embedded data"
        );
        Ok(Self {
            inner: RwLock::new(Arc::new(data)),
        })
    }

    /// Current snapshot. Cheap; hold it for the duration of one state update.
    pub fn snapshot(&self) -> Arc<RegistryData> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Refresh from the vendor CDN. On any failure the embedded (or last
    /// refreshed) data stays authoritative.
    pub async fn refresh(&self, cdn_base: &str) -> Result<()> {
        let client = cdn_client();

        let versions: Vec<String> = get_json(&client, &format!("{cdn_base}/api/versions.json")).await?;
        let Some(version) = versions.into_iter().next() else {
            return Err(AppError::Decode("empty version list from CDN".into()));
        };

        {
            let current = self.snapshot();
            if current.version == version {
                debug!(%version, "champion registry already current");
                return Ok(());
            }
        }

        let url = format!("{cdn_base}/cdn/{version}/data/en_US/champion.json");
        let listing: CdnChampionFile = get_json(&client, &url).await?;

        let current = self.snapshot();
        let mut by_id = current.by_id.clone();
        let mut added = 0usize;

        for (key, listed) in listing.data {
            let Ok(raw_id) = listed.key.parse::<u32>() else {
                warn!(champion = %key, key = %listed.key, "CDN champion key is not numeric");
                continue;
            };
            let id = ChampionId(raw_id);
            match by_id.entry(id) {
                Entry::Occupied(mut existing) => {
                    existing
                        .get_mut()
                        .display_names
                        .entry("en_US".to_string())
                        .or_insert(listed.name);
                }
                Entry::Vacant(slot) => {
                    slot.insert(Champion {
                        id,
                        canonical_name: canonical_name_for(&key),
                        display_names: HashMap::from([("en_US".to_string(), listed.name)]),
                        lane_aptitude: aptitude_from_tags(&listed.tags),
                    });
                    added += 1;
                }
            }
        }

        let next = Arc::new(RegistryData { version, by_id });
        info!(
            version = %next.version,
            champions = next.by_id.len(),
            added,
            "champion registry refreshed from CDN"
        );
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
        Ok(())
    }
}

/// Normalise a champion name for URL building: lowercase, with apostrophes,
/// spaces, periods and other punctuation stripped (`Kai'Sa` → `kaisa`,
/// `Lee Sin` → `leesin`, `Dr. Mundo` → `drmundo`).
pub fn normalise(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// The one historical exception: the client's internal `MonkeyKing` is
/// exported as `wukong` everywhere users see it.
fn canonical_name_for(internal_key: &str) -> String {
    if internal_key == "MonkeyKing" {
        "wukong".to_string()
    } else {
        normalise(internal_key)
    }
}

fn aptitude_from_tags(tags: &[String]) -> LaneAptitude {
    let mut aptitude = LaneAptitude::default();
    for (rank, tag) in tags.iter().enumerate() {
        // Primary class carries full weight, secondary half.
        let weight: u8 = if rank == 0 { 6 } else { 3 };
        match tag.as_str() {
            "Marksman" => aptitude.bottom = aptitude.bottom.max(weight),
            "Support" => aptitude.support = aptitude.support.max(weight),
            "Mage" => aptitude.middle = aptitude.middle.max(weight),
            "Assassin" => {
                aptitude.middle = aptitude.middle.max(weight);
                aptitude.jungle = aptitude.jungle.max(weight / 2);
            }
            "Fighter" => {
                aptitude.top = aptitude.top.max(weight);
                aptitude.jungle = aptitude.jungle.max(weight / 2);
            }
            "Tank" => aptitude.top = aptitude.top.max(weight),
            _ => {}
        }
    }
    aptitude
}

fn cdn_client() -> ClientWithMiddleware {
    let retry_policy = ExponentialBackoff::builder()
        .retry_bounds(
            std::time::Duration::from_millis(500),
            std::time::Duration::from_secs(5),
        )
        .build_with_max_retries(3);
    reqwest_middleware::ClientBuilder::new(reqwest::Client::new())
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
}

async fn get_json<T: serde::de::DeserializeOwned>(
    client: &ClientWithMiddleware,
    url: &str,
) -> Result<T> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::Transport(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::Http(status.as_u16()));
    }
    response
        .json()
        .await
        .map_err(|e| AppError::Decode(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct EmbeddedFile {
    version: String,
    champions: Vec<EmbeddedChampion>,
}

#[derive(Debug, Deserialize)]
struct EmbeddedChampion {
    id: u32,
    key: String,
    names: HashMap<String, String>,
    lanes: LaneAptitude,
}

#[derive(Debug, Deserialize)]
struct CdnChampionFile {
    data: HashMap<String, CdnChampion>,
}

#[derive(Debug, Deserialize)]
struct CdnChampion {
    key: String,
    name: String,
    #[serde(default)]
    tags: Vec<String>,
}

fn parse_embedded(raw: &str) -> Result<RegistryData> {
    let file: EmbeddedFile = serde_json::from_str(raw)?;
    let mut by_id = HashMap::with_capacity(file.champions.len());
    for entry in file.champions {
        let id = ChampionId(entry.id);
        by_id.insert(
            id,
            Champion {
                id,
                canonical_name: canonical_name_for(&entry.key),
                display_names: entry.names,
                lane_aptitude: entry.lanes,
            },
        );
    }
    Ok(RegistryData {
        version: file.version,
        by_id,
    })
}
