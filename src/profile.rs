//! dbt connection profiles and the interactive choice of profile and target.
//!
//! `profiles.yml` maps a profile name to its default `target` and the
//! `outputs` it can connect to:
//!
//! ```yaml
//! my_project:
//!   target: dev
//!   outputs:
//!     dev:
//!       type: snowflake
//!       account: xy12345.eu-west-1
//!       user: ANALYST
//!       password: secret
//!       warehouse: COMPUTE_WH
//!       database: ANALYTICS
//!       schema: PUBLIC
//!       role: TRANSFORMER
//! ```
//!
//! Exactly one [`ConnectionTarget`] leaves [`resolve_profile`], and it does so
//! before anything touches the network.
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

use crate::console::Console;
use crate::errors::{SetupError, SetupResult};

pub const PROFILES_FILE_NAME: &str = "profiles.yml";

/// Target used when a profile does not name one
pub const DEFAULT_TARGET: &str = "dev";

/// Top-level key dbt reserves for global settings rather than a profile
const RESERVED_CONFIG_KEY: &str = "config";

/// Connection settings of one target
#[derive(Deserialize, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    /// The dbt adapter, `snowflake` for every target this tool can use
    #[serde(rename = "type", default)]
    pub adapter: Option<String>,
    pub account: String,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    /// PKCS#8 PEM key for key-pair authentication, used instead of `password`
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
    pub warehouse: String,
    pub database: String,
    pub schema: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub protocol: Option<String>,
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("adapter", &self.adapter)
            .field("account", &self.account)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key_path", &self.private_key_path)
            .field("warehouse", &self.warehouse)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("role", &self.role)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("protocol", &self.protocol)
            .finish()
    }
}

/// One named profile
///
/// Outputs are kept undecoded so that a profile mixing adapters only fails
/// when a target this tool cannot use is actually selected.
#[derive(Deserialize, Debug, Clone)]
pub struct Profile {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub outputs: Ordered<serde_yaml_ng::Value>,
}

impl Profile {
    pub fn default_target(&self) -> &str {
        self.target.as_deref().unwrap_or(DEFAULT_TARGET)
    }
}

/// Every profile of a `profiles.yml`, in file order
#[derive(Debug, Clone, Default)]
pub struct ProfileStore {
    profiles: Ordered<Profile>,
}

impl<'de> Deserialize<'de> for ProfileStore {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut profiles = Ordered::<Profile>::deserialize(deserializer)?;
        profiles.0.retain(|(name, _)| name != RESERVED_CONFIG_KEY);
        Ok(ProfileStore { profiles })
    }
}

impl ProfileStore {
    /// Read and parse the profiles file at `path`
    pub fn load(path: &Path) -> SetupResult<ProfileStore> {
        if !path.is_file() {
            return Err(SetupError::ProfileFileNotFound(path.to_owned()));
        }
        let text = std::fs::read_to_string(path)?;
        ProfileStore::parse(&text).map_err(|source| SetupError::ProfileParse {
            path: path.to_owned(),
            source,
        })
    }

    /// Parse profiles, expanding `<<: *anchor` merge keys first
    pub fn parse(text: &str) -> Result<ProfileStore, serde_yaml_ng::Error> {
        let mut document: serde_yaml_ng::Value = serde_yaml_ng::from_str(text)?;
        document.apply_merge()?;
        serde_yaml_ng::from_value(document)
    }

    pub fn names(&self) -> Vec<&str> {
        self.profiles.keys().collect()
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    pub fn len(&self) -> usize {
        self.profiles.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.0.is_empty()
    }
}

/// A YAML mapping that keeps its keys in file order
#[derive(Debug, Clone)]
pub struct Ordered<V>(Vec<(String, V)>);

impl<V> Default for Ordered<V> {
    fn default() -> Self {
        Ordered(Vec::new())
    }
}

impl<V> Ordered<V> {
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().map(|(key, _)| key.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Ordered<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
            type Value = Ordered<V>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping")
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(Ordered::default())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(key) = map.next_key::<String>()? {
                    entries.push((key, map.next_value()?));
                }
                Ok(Ordered(entries))
            }
        }

        deserializer.deserialize_any(OrderedVisitor(PhantomData))
    }
}

/// Where `profiles.yml` is expected
///
/// An explicit directory wins. Otherwise Windows keeps it in the user's
/// `.dbt` directory and every other platform in the working directory.
pub fn profiles_path(working_dir: &Path, profiles_dir: Option<&Path>) -> SetupResult<PathBuf> {
    if let Some(dir) = profiles_dir {
        return Ok(dir.join(PROFILES_FILE_NAME));
    }
    if cfg!(windows) {
        let home = dirs::home_dir().ok_or_else(|| {
            SetupError::ProfileFileNotFound(Path::new("~").join(".dbt").join(PROFILES_FILE_NAME))
        })?;
        Ok(home.join(".dbt").join(PROFILES_FILE_NAME))
    } else {
        Ok(working_dir.join(PROFILES_FILE_NAME))
    }
}

/// The profile name a project directory implies: its name with `-` turned into `_`
pub fn candidate_profile_name(working_dir: &Path) -> String {
    working_dir
        .file_name()
        .map(|name| name.to_string_lossy().replace('-', "_"))
        .unwrap_or_default()
}

/// Pick the profile and target to connect with
///
/// The candidate is used when it names a profile, exactly or ignoring case;
/// otherwise the user picks one from the list. The user may then swap the
/// profile's default target for another of its outputs.
pub fn resolve_profile<C: Console>(
    store: &ProfileStore,
    candidate: &str,
    console: &mut C,
) -> SetupResult<(String, ConnectionTarget)> {
    let profile_name = choose_profile(store, candidate, console)?;
    let Some(profile) = store.get(&profile_name) else {
        return Err(SetupError::InvalidSelection {
            input: profile_name,
            choices: store.len(),
        });
    };

    let mut target_name = profile.default_target().to_owned();
    if confirm_target_change(&target_name, console)? {
        console.say("Please select a target:");
        let targets: Vec<&str> = profile.outputs.keys().collect();
        target_name = select(&targets, "Enter target number: ", console)?.to_owned();
    }
    log::info!("Resolved dbt profile {profile_name}, target {target_name}");

    let raw = profile
        .outputs
        .get(&target_name)
        .ok_or_else(|| SetupError::MissingTarget {
            profile: profile_name.clone(),
            target: target_name.clone(),
        })?;
    let target = serde_yaml_ng::from_value(raw.clone()).map_err(|source| {
        SetupError::InvalidTarget {
            profile: profile_name.clone(),
            target: target_name.clone(),
            source,
        }
    })?;
    Ok((profile_name, target))
}

fn choose_profile<C: Console>(
    store: &ProfileStore,
    candidate: &str,
    console: &mut C,
) -> SetupResult<String> {
    if store.get(candidate).is_some() {
        return Ok(candidate.to_owned());
    }

    let names = store.names();
    console.say(&format!("Profile '{candidate}' not found in {PROFILES_FILE_NAME}."));
    console.say(&format!("Available profiles: {names:?}"));

    if let Some(name) = names
        .iter()
        .find(|name| name.to_lowercase() == candidate.to_lowercase())
    {
        console.say(&format!("Using profile '{name}' instead."));
        return Ok((*name).to_owned());
    }

    console.say("Please select a profile:");
    Ok(select(&names, "Enter profile number: ", console)?.to_owned())
}

/// Ask until the answer is `y` or `n`
fn confirm_target_change<C: Console>(target: &str, console: &mut C) -> SetupResult<bool> {
    loop {
        console.say(&format!("Current Selected Target : {target}"));
        console.say("Would you like to change it? (y/n)");
        match console.read_line()?.trim().to_lowercase().as_str() {
            "y" => return Ok(true),
            "n" => return Ok(false),
            _ => console.say("Invalid input. Please enter 'y' or 'n'."),
        }
    }
}

/// List `options` with their indices and read one index, with no second chance
fn select<'a, C: Console>(
    options: &[&'a str],
    prompt: &str,
    console: &mut C,
) -> SetupResult<&'a str> {
    for (index, option) in options.iter().enumerate() {
        console.say(&format!("{index}: {option}"));
    }
    let input = console.ask(prompt)?;
    let choice = input
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|index| options.get(index).copied());
    choice.ok_or(SetupError::InvalidSelection {
        input,
        choices: options.len(),
    })
}
