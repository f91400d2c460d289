use crate::snapshot::CensusSnapshot;
use nodescout_core::NodeClass;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Maps node type names to census entries.
///
/// Exact builtin names win, then exact custom names. Decorated names of the
/// form `Base (Hint)` fall back to a fuzzy match against custom entries whose
/// package contains `Hint`; a confirmed match is memoized so the next lookup
/// is exact.
pub struct NodeClassifier {
    builtin: HashSet<String>,
    custom: RwLock<BTreeMap<String, String>>,
}

impl NodeClassifier {
    pub fn new(snapshot: &CensusSnapshot) -> Self {
        Self {
            builtin: snapshot.builtin.iter().cloned().collect(),
            custom: RwLock::new(snapshot.custom.clone()),
        }
    }

    pub fn classify(&self, name: &str) -> NodeClass {
        if self.builtin.contains(name) {
            return NodeClass::Builtin;
        }
        if let Some(package) = self.custom.read().get(name) {
            return NodeClass::Custom {
                package: package.clone(),
            };
        }
        match self.fuzzy_match(name) {
            Some(package) => {
                debug!("Memoizing '{}' -> {}", name, package);
                self.custom
                    .write()
                    .insert(name.to_string(), package.clone());
                NodeClass::Custom { package }
            }
            None => NodeClass::Unknown,
        }
    }

    /// Distinct names in input order, each classified once.
    pub fn classify_all<'a, I>(&self, names: I) -> Vec<(String, NodeClass)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = HashSet::new();
        names
            .into_iter()
            .filter(|name| seen.insert(*name))
            .map(|name| (name.to_string(), self.classify(name)))
            .collect()
    }

    pub fn package_of(&self, name: &str) -> Option<String> {
        self.custom.read().get(name).cloned()
    }

    pub fn is_memoized(&self, name: &str) -> bool {
        self.custom.read().contains_key(name)
    }

    fn fuzzy_match(&self, name: &str) -> Option<String> {
        let (base, hint) = split_decorated(name)?;
        let hint = hint.to_lowercase();
        let base = normalize(base);
        if base.is_empty() {
            return None;
        }
        let custom = self.custom.read();
        custom
            .iter()
            .filter(|(_, package)| package.to_lowercase().contains(&hint))
            .find(|(candidate, _)| {
                let candidate = normalize(candidate);
                !candidate.is_empty() && (base.contains(&candidate) || candidate.contains(&base))
            })
            .map(|(_, package)| package.clone())
    }
}

/// `"Base (Hint)"` -> `("Base", "Hint")`, using the last parenthesis pair.
pub fn split_decorated(name: &str) -> Option<(&str, &str)> {
    let open = name.rfind('(')?;
    let close = name.rfind(')')?;
    if close <= open {
        return None;
    }
    Some((name[..open].trim(), &name[open + 1..close]))
}

/// Lowercase with `_` and spaces removed.
fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| *c != '_' && *c != ' ')
        .flat_map(char::to_lowercase)
        .collect()
}
