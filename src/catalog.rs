//! Static catalog of MTA realtime feeds and the cache-timeout policy.
//!
//! The catalog maps a [`Category`] to its feed identifiers and source URLs.
//! The set of feeds is fixed once the catalog is built; there is no runtime
//! registration. [`TimeoutTable`] holds the two-tier timeout policy used to
//! judge cache freshness at read time.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const MTA_BASE: &str = "https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds";

/// Timeout returned when neither a feed override nor a category default exists.
pub const GLOBAL_TIMEOUT_SECS: u64 = 60;

/// A group of feeds sharing a namespace and a default cache timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Subway,
    Lirr,
    Mnr,
    Alerts,
    Accessibility,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Subway,
        Category::Lirr,
        Category::Mnr,
        Category::Alerts,
        Category::Accessibility,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Subway => "subway",
            Category::Lirr => "lirr",
            Category::Mnr => "mnr",
            Category::Alerts => "alerts",
            Category::Accessibility => "accessibility",
        }
    }

    /// Noun used in the "Invalid ..." message for unknown identifiers.
    pub(crate) fn invalid_label(&self) -> &'static str {
        match self {
            Category::Subway => "subway feed",
            Category::Lirr => "LIRR feed",
            Category::Mnr => "MNR feed",
            Category::Alerts => "alert type",
            Category::Accessibility => "accessibility data type",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow::anyhow!("unknown feed category '{s}'"))
    }
}

/// Two-tier cache timeout policy.
///
/// Keys are either a bare feed id (specific override) or
/// `"<category>_default"`. Lookups never merge tiers: the first match wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct TimeoutTable(HashMap<String, u64>);

impl TimeoutTable {
    pub fn new(entries: HashMap<String, u64>) -> Self {
        Self(entries)
    }

    /// Resolves the timeout in seconds for `item_id` within `category`.
    pub fn resolve(&self, category: Category, item_id: &str) -> u64 {
        if let Some(secs) = self.0.get(item_id) {
            return *secs;
        }

        self.0
            .get(&format!("{category}_default"))
            .copied()
            .unwrap_or(GLOBAL_TIMEOUT_SECS)
    }

    pub fn mta_defaults() -> Self {
        let entries = [
            ("subway_default", 30),
            ("lirr_default", 60),
            ("mnr_default", 60),
            ("alerts_default", 180),
            ("accessibility_default", 300),
            ("lirr_alerts", 300),
            ("mnr_alerts", 300),
            ("upcoming", 1800),
            ("equipment", 3600),
        ];
        Self(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

/// On-disk catalog layout. Either section may be omitted.
///
/// ```json
/// {
///   "feeds": { "subway": { "ace": "https://..." } },
///   "cache_timeouts": { "subway_default": 30, "equipment": 3600 }
/// }
/// ```
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    feeds: Option<BTreeMap<Category, BTreeMap<String, String>>>,
    #[serde(default)]
    cache_timeouts: Option<TimeoutTable>,
}

/// Feed catalog plus timeout policy.
#[derive(Debug, Clone)]
pub struct FeedCatalog {
    feeds: BTreeMap<Category, BTreeMap<String, String>>,
    timeouts: TimeoutTable,
}

impl FeedCatalog {
    pub fn new(
        feeds: BTreeMap<Category, BTreeMap<String, String>>,
        timeouts: TimeoutTable,
    ) -> Self {
        let feeds = feeds
            .into_iter()
            .map(|(category, entries)| {
                let entries = entries
                    .into_iter()
                    .map(|(id, url)| (id, url.trim().to_string()))
                    .collect();
                (category, entries)
            })
            .collect();
        Self { feeds, timeouts }
    }

    /// The MTA feeds and timeouts used when no catalog file is configured.
    pub fn mta_defaults() -> Self {
        let mut feeds: BTreeMap<Category, BTreeMap<String, String>> = BTreeMap::new();
        let mut add = |category: Category, id: &str, path: &str| {
            feeds
                .entry(category)
                .or_default()
                .insert(id.to_string(), format!("{MTA_BASE}/{path}"));
        };

        add(Category::Subway, "ace", "nyct%2Fgtfs-ace");
        add(Category::Subway, "bdfm", "nyct%2Fgtfs-bdfm");
        add(Category::Subway, "g", "nyct%2Fgtfs-g");
        add(Category::Subway, "jz", "nyct%2Fgtfs-jz");
        add(Category::Subway, "nqrw", "nyct%2Fgtfs-nqrw");
        add(Category::Subway, "l", "nyct%2Fgtfs-l");
        add(Category::Subway, "num_s", "nyct%2Fgtfs");
        add(Category::Subway, "sir", "nyct%2Fgtfs-si");

        add(Category::Lirr, "lirr", "lirr%2Fgtfs-lirr");
        add(Category::Mnr, "mnr", "mnr%2Fgtfs-mnr");

        add(Category::Alerts, "all_alerts", "camsys%2Fall-alerts");
        add(Category::Alerts, "subway_alerts", "camsys%2Fsubway-alerts");
        add(Category::Alerts, "bus_alerts", "camsys%2Fbus-alerts");
        add(Category::Alerts, "lirr_alerts", "camsys%2Flirr-alerts");
        add(Category::Alerts, "mnr_alerts", "camsys%2Fmnr-alerts");

        add(Category::Accessibility, "current", "nyct%2Fnyct_ene.json");
        add(Category::Accessibility, "upcoming", "nyct%2Fnyct_ene_upcoming.json");
        add(Category::Accessibility, "equipment", "nyct%2Fnyct_ene_equipments.json");

        Self::new(feeds, TimeoutTable::mta_defaults())
    }

    /// Loads a catalog from a JSON file at `path`, falling back to the MTA
    /// defaults for any section the file leaves out.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog file '{path}'"))?;
        Self::from_json(&content).with_context(|| format!("invalid catalog file '{path}'"))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(content)?;
        let defaults = Self::mta_defaults();

        Ok(Self::new(
            file.feeds.unwrap_or(defaults.feeds),
            file.cache_timeouts.unwrap_or(defaults.timeouts),
        ))
    }

    /// Returns the source URL for `feed_id`, if it belongs to `category`.
    pub fn source_url(&self, category: Category, feed_id: &str) -> Option<&str> {
        self.feeds
            .get(&category)
            .and_then(|entries| entries.get(feed_id))
            .map(String::as_str)
    }

    /// Feed ids registered under `category`, in sorted order.
    pub fn feed_ids(&self, category: Category) -> Vec<String> {
        self.feeds
            .get(&category)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// `{feed_id: url}` for every feed in `category`.
    pub fn feeds(&self, category: Category) -> BTreeMap<String, String> {
        self.feeds.get(&category).cloned().unwrap_or_default()
    }

    pub fn timeout_secs(&self, category: Category, item_id: &str) -> u64 {
        self.timeouts.resolve(category, item_id)
    }
}

impl Default for FeedCatalog {
    fn default() -> Self {
        Self::mta_defaults()
    }
}
