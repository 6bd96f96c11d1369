//! Namespaced key/value settings attached to sites, directories and file servers.

use derive_more::Display;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::{Error, Result};

/// Profile namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum Namespace {
    #[display("env")]
    Env,
    #[display("condor")]
    Condor,
    #[display("globus")]
    Globus,
    #[display("pegasus")]
    Pegasus,
    #[display("dagman")]
    Dagman,
    #[display("hints")]
    Hints,
    #[display("selector")]
    Selector,
    #[display("stat")]
    Stat,
    #[display("metadata")]
    Metadata,
}

impl FromStr for Namespace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "env" => Ok(Self::Env),
            "condor" => Ok(Self::Condor),
            "globus" => Ok(Self::Globus),
            // vds is the pre-pegasus name of the same namespace
            "pegasus" | "vds" => Ok(Self::Pegasus),
            "dagman" => Ok(Self::Dagman),
            "hints" => Ok(Self::Hints),
            "selector" => Ok(Self::Selector),
            "stat" => Ok(Self::Stat),
            "metadata" => Ok(Self::Metadata),
            _ => Err(Error::invalid("profile namespace", s)),
        }
    }
}

/// A single namespaced setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub namespace: Namespace,
    pub key: String,
    pub value: String,
}

impl Profile {
    pub fn new(namespace: Namespace, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            namespace,
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Profiles grouped by namespace. A later value for the same key replaces the earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Profiles {
    namespaces: BTreeMap<Namespace, BTreeMap<String, String>>,
}

impl Profiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, profile: Profile) {
        self.insert(profile.namespace, profile.key, profile.value);
    }

    pub fn insert(
        &mut self,
        namespace: Namespace,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.namespaces
            .entry(namespace)
            .or_default()
            .insert(key.into(), value.into())
    }

    pub fn get(&self, namespace: Namespace, key: &str) -> Option<&str> {
        self.namespaces
            .get(&namespace)
            .and_then(|ns| ns.get(key))
            .map(String::as_str)
    }

    pub fn namespace(&self, namespace: Namespace) -> Option<&BTreeMap<String, String>> {
        self.namespaces.get(&namespace)
    }

    pub fn remove(&mut self, namespace: Namespace, key: &str) -> Option<String> {
        let ns = self.namespaces.get_mut(&namespace)?;
        let removed = ns.remove(key);
        if ns.is_empty() {
            self.namespaces.remove(&namespace);
        }
        removed
    }

    /// Copy every entry of `other` into `self`, overriding existing keys.
    pub fn merge(&mut self, other: &Profiles) {
        for profile in other.iter() {
            self.add(profile);
        }
    }

    /// Iterate all profiles ordered by namespace, then key.
    pub fn iter(&self) -> impl Iterator<Item = Profile> + '_ {
        self.namespaces.iter().flat_map(|(ns, entries)| {
            entries
                .iter()
                .map(move |(k, v)| Profile::new(*ns, k.clone(), v.clone()))
        })
    }

    pub fn len(&self) -> usize {
        self.namespaces.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }
}

impl FromIterator<Profile> for Profiles {
    fn from_iter<I: IntoIterator<Item = Profile>>(iter: I) -> Self {
        let mut profiles = Profiles::new();
        for p in iter {
            profiles.add(p);
        }
        profiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_later_value_overrides() {
        let mut profiles = Profiles::new();
        profiles.insert(Namespace::Env, "PATH", "/bin");
        let previous = profiles.insert(Namespace::Env, "PATH", "/usr/bin");
        assert_eq!(previous.as_deref(), Some("/bin"));
        assert_eq!(profiles.get(Namespace::Env, "PATH"), Some("/usr/bin"));
        assert_eq!(profiles.len(), 1);
    }

    #[test]
    fn test_vds_alias() {
        assert_eq!("vds".parse::<Namespace>().unwrap(), Namespace::Pegasus);
        assert_eq!("ENV".parse::<Namespace>().unwrap(), Namespace::Env);
        assert!("bogus".parse::<Namespace>().is_err());
    }

    #[test]
    fn test_remove_drops_empty_namespace() {
        let mut profiles = Profiles::new();
        profiles.insert(Namespace::Condor, "universe", "vanilla");
        assert_eq!(
            profiles.remove(Namespace::Condor, "universe").as_deref(),
            Some("vanilla")
        );
        assert!(profiles.is_empty());
        assert!(profiles.namespace(Namespace::Condor).is_none());
    }

    #[test]
    fn test_merge_and_iter_order() {
        let mut a: Profiles = [
            Profile::new(Namespace::Pegasus, "style", "condor"),
            Profile::new(Namespace::Env, "HOME", "/home/a"),
        ]
        .into_iter()
        .collect();
        let b: Profiles = [Profile::new(Namespace::Env, "HOME", "/home/b")]
            .into_iter()
            .collect();

        a.merge(&b);
        let all: Vec<Profile> = a.iter().collect();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], Profile::new(Namespace::Env, "HOME", "/home/b"));
        assert_eq!(all[1].namespace, Namespace::Pegasus);
    }
}
