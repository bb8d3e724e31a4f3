//! Phonetic fingerprinting of names, used as blocking keys for dedup.
//!
//! Every algorithm runs on the normalized [`fingerprint`] of a value and on
//! each of its long tokens. The free functions are uncached; [`Fingerprinter`]
//! memoizes them in bounded caches owned by the caller.

use std::{
  collections::{BTreeSet, HashMap, VecDeque},
  fmt,
  hash::Hash,
  str::FromStr,
};

use rphonetic::{DoubleMetaphone, Encoder, Soundex};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::{Error, Result};

/// Tokens shorter than this are only indexed as part of the whole value.
const MIN_TOKEN_LENGTH: usize = 6;

pub const DEFAULT_CACHE_SIZE: usize = 100_000;

const COMPANY_FORMS: &[(&str, &str)] = &[
  ("aktiengesellschaft", "ag"),
  ("company", "co"),
  ("corporation", "corp"),
  ("gesellschaft", "ges"),
  ("incorporated", "inc"),
  ("kommanditgesellschaft", "kg"),
  ("limited", "ltd"),
  ("societe", "soc"),
];

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PhoneticAlgorithm {
  Fingerprint,
  #[default]
  Metaphone1,
  Metaphone2,
  Soundex,
}

impl PhoneticAlgorithm {
  pub fn parse(name: &str) -> Result<Self> {
    Self::from_str(name).map_err(|_| Error::InvalidAlgorithm(name.to_owned()))
  }
}

// ─── Pure functions ──────────────────────────────────────────────────────────

/// Normalize a name for comparison: transliterate to Latin, strip
/// diacritics, lowercase, drop punctuation, abbreviate company forms,
/// deduplicate and sort tokens.
///
/// `"Tchibo Holding AG"` becomes `"ag holding tchibo"`, `"Владимир Путин"`
/// becomes `"putin vladimir"`.
pub fn fingerprint(value: &str) -> String {
  let text: String = deunicode::deunicode(value)
    .nfkd()
    .filter(|c| !is_combining_mark(*c))
    .flat_map(char::to_lowercase)
    .map(|c| if c.is_alphanumeric() { c } else { ' ' })
    .collect();
  let mut tokens: Vec<&str> = text.split_whitespace().map(company_form).collect();
  tokens.sort_unstable();
  tokens.dedup();
  tokens.join(" ")
}

fn company_form(token: &str) -> &str {
  COMPANY_FORMS
    .iter()
    .find(|(long, _)| *long == token)
    .map_or(token, |(_, short)| *short)
}

/// The whole value plus every whitespace token longer than five characters.
pub fn tokenize(value: &str) -> BTreeSet<String> {
  let mut tokens = BTreeSet::new();
  tokens.insert(value.to_owned());
  tokens.extend(
    value
      .split_whitespace()
      .filter(|t| t.chars().count() >= MIN_TOKEN_LENGTH)
      .map(str::to_owned),
  );
  tokens
}

/// Primary and alternate double-metaphone codes.
pub fn metaphone(value: &str) -> (String, String) {
  encode_metaphone(&DoubleMetaphone::default(), value)
}

pub fn soundex(value: &str) -> String {
  Soundex::default().encode(&ascii_only(value))
}

/// Phonetic tokens for `value`.
///
/// A value without a fingerprint yields a single empty token.
pub fn get_phonetics(value: &str, algorithm: PhoneticAlgorithm) -> Vec<String> {
  let fp = fingerprint(value);
  if fp.is_empty() {
    return vec![String::new()];
  }
  let tokens = tokenize(&fp);
  match algorithm {
    PhoneticAlgorithm::Fingerprint => tokens.into_iter().collect(),
    PhoneticAlgorithm::Metaphone1 => {
      tokens.iter().map(|t| metaphone(t).0).collect()
    }
    PhoneticAlgorithm::Metaphone2 => {
      tokens.iter().map(|t| metaphone(t).1).collect()
    }
    PhoneticAlgorithm::Soundex => tokens.iter().map(|t| soundex(t)).collect(),
  }
}

fn encode_metaphone(encoder: &DoubleMetaphone, value: &str) -> (String, String) {
  let value = ascii_only(value);
  (encoder.encode(&value), encoder.encode_alternate(&value))
}

/// The encoders index their code tables by ASCII offset and panic on any
/// other letter.
fn ascii_only(value: &str) -> String {
  value.chars().filter(char::is_ascii).collect()
}

// ─── Bounded cache ───────────────────────────────────────────────────────────

/// A capacity-limited map evicting the oldest insertion first.
#[derive(Debug, Clone)]
pub struct BoundedCache<K, V> {
  capacity: usize,
  entries:  HashMap<K, V>,
  order:    VecDeque<K>,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedCache<K, V> {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity,
      entries: HashMap::new(),
      order: VecDeque::new(),
    }
  }

  pub fn capacity(&self) -> usize { self.capacity }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  pub fn clear(&mut self) {
    self.entries.clear();
    self.order.clear();
  }

  pub fn get(&self, key: &K) -> Option<&V> { self.entries.get(key) }

  pub fn insert(&mut self, key: K, value: V) {
    if self.capacity == 0 {
      return;
    }
    if self.entries.insert(key.clone(), value).is_some() {
      return;
    }
    self.order.push_back(key);
    while self.order.len() > self.capacity {
      if let Some(oldest) = self.order.pop_front() {
        self.entries.remove(&oldest);
      }
    }
  }

  /// Return the cached value for `key`, computing and storing it if absent.
  pub fn get_or_insert_with(&mut self, key: K, f: impl FnOnce() -> V) -> V {
    if let Some(value) = self.entries.get(&key) {
      return value.clone();
    }
    let value = f();
    self.insert(key, value.clone());
    value
  }
}

// ─── Fingerprinter ───────────────────────────────────────────────────────────

/// Memoizing front-end to the phonetic functions.
pub struct Fingerprinter {
  fingerprints: BoundedCache<String, String>,
  metaphones:   BoundedCache<String, (String, String)>,
  soundexes:    BoundedCache<String, String>,
  phonetics:    BoundedCache<(String, PhoneticAlgorithm), Vec<String>>,
  double_meta:  DoubleMetaphone,
  soundex:      Soundex,
}

impl Fingerprinter {
  /// Each of the four caches holds at most `capacity` entries.
  pub fn new(capacity: usize) -> Self {
    Self {
      fingerprints: BoundedCache::new(capacity),
      metaphones:   BoundedCache::new(capacity),
      soundexes:    BoundedCache::new(capacity),
      phonetics:    BoundedCache::new(capacity),
      double_meta:  DoubleMetaphone::default(),
      soundex:      Soundex::default(),
    }
  }

  pub fn fingerprint(&mut self, value: &str) -> String {
    self
      .fingerprints
      .get_or_insert_with(value.to_owned(), || fingerprint(value))
  }

  pub fn metaphone(&mut self, value: &str) -> (String, String) {
    let encoder = &self.double_meta;
    self
      .metaphones
      .get_or_insert_with(value.to_owned(), || encode_metaphone(encoder, value))
  }

  pub fn soundex(&mut self, value: &str) -> String {
    let encoder = &self.soundex;
    self
      .soundexes
      .get_or_insert_with(value.to_owned(), || encoder.encode(&ascii_only(value)))
  }

  pub fn phonetics(
    &mut self,
    value: &str,
    algorithm: PhoneticAlgorithm,
  ) -> Vec<String> {
    let key = (value.to_owned(), algorithm);
    if let Some(cached) = self.phonetics.get(&key) {
      return cached.clone();
    }
    let fp = self.fingerprint(value);
    let tokens = if fp.is_empty() {
      vec![String::new()]
    } else {
      tokenize(&fp)
        .into_iter()
        .map(|t| match algorithm {
          PhoneticAlgorithm::Fingerprint => t,
          PhoneticAlgorithm::Metaphone1 => self.metaphone(&t).0,
          PhoneticAlgorithm::Metaphone2 => self.metaphone(&t).1,
          PhoneticAlgorithm::Soundex => self.soundex(&t),
        })
        .collect()
    };
    self.phonetics.insert(key, tokens.clone());
    tokens
  }

  /// Entries currently held, summed over all caches.
  pub fn cached(&self) -> usize {
    self.fingerprints.len()
      + self.metaphones.len()
      + self.soundexes.len()
      + self.phonetics.len()
  }

  pub fn clear(&mut self) {
    self.fingerprints.clear();
    self.metaphones.clear();
    self.soundexes.clear();
    self.phonetics.clear();
  }
}

impl Default for Fingerprinter {
  fn default() -> Self { Self::new(DEFAULT_CACHE_SIZE) }
}

impl fmt::Debug for Fingerprinter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Fingerprinter")
      .field("capacity", &self.fingerprints.capacity())
      .field("cached", &self.cached())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator as _;

  use super::*;

  #[test]
  fn fingerprint_normalizes_and_sorts() {
    assert_eq!(fingerprint("Tchibo Holding AG"), "ag holding tchibo");
    assert_eq!(fingerprint("  Société Générale!! "), "generale soc");
    assert_eq!(fingerprint("ACME Limited, ACME"), "acme ltd");
    assert_eq!(fingerprint("--"), "");
  }

  #[test]
  fn tokenize_keeps_whole_value_and_long_tokens() {
    let tokens = tokenize("ag holding tchibo");
    assert!(tokens.contains("ag holding tchibo"));
    assert!(tokens.contains("holding"));
    assert!(tokens.contains("tchibo"));
    assert!(!tokens.contains("ag"));
    assert_eq!(tokens.len(), 3);
  }

  #[test]
  fn empty_fingerprint_yields_empty_token() {
    for algorithm in PhoneticAlgorithm::iter() {
      assert_eq!(get_phonetics("...", algorithm), vec![String::new()]);
    }
  }

  #[test]
  fn phonetics_are_deterministic() {
    for algorithm in PhoneticAlgorithm::iter() {
      let a = get_phonetics("Jane Doe", algorithm);
      let b = get_phonetics("jane   DOE", algorithm);
      assert_eq!(a, b);
      assert!(!a.is_empty());
    }
  }

  #[test]
  fn non_latin_names_are_transliterated() {
    assert_eq!(fingerprint("Владимир Путин"), "putin vladimir");
    assert_eq!(fingerprint("北京"), "bei jing");

    let codes = get_phonetics("Владимир Путин", PhoneticAlgorithm::Soundex);
    assert_eq!(codes.len(), 2);
    assert!(codes.contains(&"V435".to_owned()));
    for algorithm in PhoneticAlgorithm::iter() {
      for name in ["北京", "Ελληνικά", "Ærøskøbing", "Şişli"] {
        let tokens = get_phonetics(name, algorithm);
        assert!(tokens.iter().all(|t| !t.is_empty()), "{name} {algorithm}");
      }
    }
  }

  #[test]
  fn encoders_ignore_non_ascii_letters() {
    assert_eq!(soundex("Путин"), "");
    assert_eq!(soundex("Müller"), soundex("Mller"));
    assert_eq!(metaphone("Путин"), (String::new(), String::new()));
    let mut fpx = Fingerprinter::new(4);
    assert_eq!(fpx.soundex("Путин"), "");
  }

  #[test]
  fn algorithm_names_parse() {
    assert_eq!(
      PhoneticAlgorithm::parse("metaphone2").unwrap(),
      PhoneticAlgorithm::Metaphone2
    );
    assert_eq!(PhoneticAlgorithm::Soundex.to_string(), "soundex");
    assert_eq!(PhoneticAlgorithm::default(), PhoneticAlgorithm::Metaphone1);
    assert!(matches!(
      PhoneticAlgorithm::parse("caverphone"),
      Err(Error::InvalidAlgorithm(_))
    ));
  }

  #[test]
  fn cached_results_match_uncached() {
    let mut fpx = Fingerprinter::new(16);
    for algorithm in PhoneticAlgorithm::iter() {
      assert_eq!(
        fpx.phonetics("Tchibo Holding AG", algorithm),
        get_phonetics("Tchibo Holding AG", algorithm)
      );
    }
    assert_eq!(fpx.metaphone("smith"), metaphone("smith"));
    assert_eq!(fpx.soundex("smith"), soundex("smith"));
  }

  #[test]
  fn bounded_cache_evicts_oldest() {
    let mut cache = BoundedCache::new(2);
    cache.insert("a", 1);
    cache.insert("b", 2);
    cache.insert("c", 3);
    assert_eq!(cache.len(), 2);
    assert!(cache.get(&"a").is_none());
    assert_eq!(cache.get(&"c"), Some(&3));

    let mut off = BoundedCache::new(0);
    assert_eq!(off.get_or_insert_with("x", || 7), 7);
    assert!(off.is_empty());
  }
}
