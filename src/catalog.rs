//! Class catalogs.
//!
//! A `ClassCatalog` maps a model's class index to a human-readable label and
//! names the labels that raise alerts. Catalogs are immutable once built and
//! are shared read-only across every frame of a session.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Labels of the animal detection model, in class-index order.
pub const ANIMAL_CLASSES: &[&str] = &[
    "antelope",
    "badger",
    "bat",
    "bear",
    "bee",
    "beetle",
    "bison",
    "boar",
    "butterfly",
    "cat",
    "caterpillar",
    "chimpanzee",
    "cockroach",
    "cow",
    "coyote",
    "crab",
    "cranefly",
    "crow",
    "deer",
    "dog",
    "dolphin",
    "donkey",
    "dragonfly",
    "duck",
    "eagle",
    "elephant",
    "flamingo",
    "fly",
    "fox",
    "goat",
    "goldfish",
    "goose",
    "gorilla",
    "grasshopper",
    "hamster",
    "hare",
    "hedgehog",
    "hippopotamus",
    "hornbill",
    "horse",
    "hummingbird",
    "hyena",
    "jellyfish",
    "kangaroo",
    "koala",
    "ladybug",
    "leopard",
    "lion",
    "lizard",
    "lobster",
    "mosquito",
    "moth",
    "mouse",
    "octopus",
    "okapi",
    "orangutan",
    "otter",
    "owl",
    "ox",
    "oyster",
    "panda",
    "parrot",
    "pelecaniformes",
    "penguin",
    "pig",
    "pigeon",
    "porcupine",
    "possum",
    "raccoon",
    "rat",
    "reindeer",
    "rhinoceros",
    "sandpiper",
    "seahorse",
    "seal",
    "shark",
    "sheep",
    "snake",
    "sparrow",
    "squid",
    "squirrel",
    "starfish",
    "swan",
    "tiger",
    "turkey",
    "turtle",
    "whale",
    "wolf",
    "wombat",
    "woodpecker",
    "zebra",
];

/// Labels of the fire detection model.
pub const FIRE_CLASSES: &[&str] = &["fire"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassCatalog {
    labels: Vec<String>,
    watched: BTreeSet<String>,
}

impl ClassCatalog {
    /// Build a catalog. Every watched label must be one of `labels`.
    pub fn new<L, W>(labels: L, watched: W) -> Result<Self>
    where
        L: IntoIterator,
        L::Item: Into<String>,
        W: IntoIterator,
        W::Item: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(anyhow!("class catalog must contain at least one label"));
        }
        let watched: BTreeSet<String> = watched.into_iter().map(Into::into).collect();
        if let Some(unknown) = watched.iter().find(|w| !labels.contains(*w)) {
            return Err(anyhow!(
                "watched label '{}' is not in the class catalog",
                unknown
            ));
        }
        Ok(Self { labels, watched })
    }

    pub fn fire() -> Self {
        Self::all_watched(FIRE_CLASSES)
    }

    pub fn animals() -> Self {
        Self::all_watched(ANIMAL_CLASSES)
    }

    fn all_watched(labels: &[&str]) -> Self {
        Self {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            watched: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    /// Label for a class index, if the index is in range.
    pub fn label(&self, class_id: usize) -> Option<&str> {
        self.labels.get(class_id).map(String::as_str)
    }

    pub fn is_watched(&self, label: &str) -> bool {
        self.watched.contains(label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn watched(&self) -> &BTreeSet<String> {
        &self.watched
    }
}

/// Which model and catalog a session runs with. Chosen before the stream starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionProfile {
    #[default]
    Fire,
    Animal,
}

impl DetectionProfile {
    pub fn catalog(self) -> ClassCatalog {
        match self {
            DetectionProfile::Fire => ClassCatalog::fire(),
            DetectionProfile::Animal => ClassCatalog::animals(),
        }
    }
}

impl FromStr for DetectionProfile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fire" => Ok(DetectionProfile::Fire),
            "animal" | "animals" => Ok(DetectionProfile::Animal),
            other => Err(anyhow!(
                "unknown detection profile '{}' (expected fire or animal)",
                other
            )),
        }
    }
}

impl fmt::Display for DetectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionProfile::Fire => f.write_str("fire"),
            DetectionProfile::Animal => f.write_str("animal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn animal_catalog_indexes_labels_in_model_order() {
        let catalog = ClassCatalog::animals();
        assert_eq!(catalog.len(), 91);
        assert_eq!(catalog.label(0), Some("antelope"));
        assert_eq!(catalog.label(19), Some("dog"));
        assert_eq!(catalog.label(28), Some("fox"));
        assert_eq!(catalog.label(90), Some("zebra"));
        assert_eq!(catalog.label(91), None);
        assert!(catalog.is_watched("fox"));
    }

    #[test]
    fn fire_catalog_watches_fire() {
        let catalog = ClassCatalog::fire();
        assert_eq!(catalog.label(0), Some("fire"));
        assert!(catalog.is_watched("fire"));
        assert!(!catalog.is_watched("smoke"));
    }

    #[test]
    fn custom_catalog_rejects_unknown_watched_label() {
        let err = ClassCatalog::new(["person", "dog"], ["cat"]).unwrap_err();
        assert!(err.to_string().contains("cat"));
        assert!(ClassCatalog::new(Vec::<String>::new(), Vec::<String>::new()).is_err());
    }

    #[test]
    fn custom_catalog_may_leave_labels_unwatched() {
        let catalog = ClassCatalog::new(["person", "dog"], ["dog"]).unwrap();
        assert!(!catalog.is_watched("person"));
        assert!(catalog.is_watched("dog"));
    }

    #[test]
    fn profile_parses_case_insensitively() {
        assert_eq!("Fire".parse::<DetectionProfile>().unwrap(), DetectionProfile::Fire);
        assert_eq!(
            "animal".parse::<DetectionProfile>().unwrap(),
            DetectionProfile::Animal
        );
        assert!("smoke".parse::<DetectionProfile>().is_err());
        assert_eq!(DetectionProfile::Animal.catalog().len(), 91);
    }
}
