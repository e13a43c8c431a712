//! Compound Key Module
//!
//! Maps a (collection, key) pair onto a single identifier for backends with a
//! flat key space, and provides the prefix helpers used by the namespace
//! wrappers.
//!
//! Encoding: `escape(collection) + "::" + key`, where `escape` turns `\` into
//! `\\` and `:` into `\:`. The escaped collection never contains an unescaped
//! `:`, so the first unescaped `:` always starts the separator and the mapping
//! is injective. This format is part of the stored contract.

use crate::error::{KvError, Result};

/// Separator between the collection and key of a compound key
pub const COMPOUND_SEPARATOR: &str = "::";

/// Separator between a prefix and the prefixed name
pub const PREFIX_SEPARATOR: &str = "__";

const ESCAPE: char = '\\';

fn escape_collection(collection: &str) -> String {
    let mut out = String::with_capacity(collection.len());
    for ch in collection.chars() {
        if ch == ESCAPE || ch == ':' {
            out.push(ESCAPE);
        }
        out.push(ch);
    }
    out
}

// == Compound Keys ==
/// Encodes (collection, key) into one backend identifier.
pub fn compound_key(collection: &str, key: &str) -> String {
    let mut out = escape_collection(collection);
    out.push_str(COMPOUND_SEPARATOR);
    out.push_str(key);
    out
}

/// Decodes an identifier produced by [`compound_key`].
pub fn uncompound_key(compound: &str) -> Result<(String, String)> {
    let mut collection = String::new();
    let mut chars = compound.char_indices();

    while let Some((idx, ch)) = chars.next() {
        match ch {
            ESCAPE => match chars.next() {
                Some((_, escaped)) if escaped == ESCAPE || escaped == ':' => {
                    collection.push(escaped)
                }
                _ => return Err(not_compound(compound)),
            },
            ':' => {
                let rest = &compound[idx..];
                return match rest.strip_prefix(COMPOUND_SEPARATOR) {
                    Some(key) => Ok((collection, key.to_string())),
                    None => Err(not_compound(compound)),
                };
            }
            other => collection.push(other),
        }
    }

    Err(not_compound(compound))
}

fn not_compound(s: &str) -> KvError {
    KvError::InvalidKey(format!("'{s}' is not a compound key"))
}

/// Returns the distinct collections found in a set of compound keys,
/// in first-seen order. Identifiers that do not decode are skipped.
pub fn collections_from_compound_keys<'a, I>(compound_keys: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = Vec::new();
    for (collection, _) in compound_keys
        .into_iter()
        .filter_map(|k| uncompound_key(k).ok())
    {
        if !seen.contains(&collection) {
            seen.push(collection);
        }
    }
    seen
}

/// Returns the keys belonging to `collection` in a set of compound keys.
pub fn keys_from_compound_keys<'a, I>(compound_keys: I, collection: &str) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    compound_keys
        .into_iter()
        .filter_map(|k| uncompound_key(k).ok())
        .filter(|(c, _)| c == collection)
        .map(|(_, k)| k)
        .collect()
}

// == Prefixes ==
/// Prepends `prefix` and the prefix separator to `name`.
pub fn prefix_name(prefix: &str, name: &str) -> String {
    format!("{prefix}{PREFIX_SEPARATOR}{name}")
}

/// Strips `prefix` and the prefix separator from `name`.
///
/// Returns None when `name` was not produced by [`prefix_name`] with this prefix.
pub fn unprefix_name<'a>(prefix: &str, name: &'a str) -> Option<&'a str> {
    name.strip_prefix(prefix)?.strip_prefix(PREFIX_SEPARATOR)
}
