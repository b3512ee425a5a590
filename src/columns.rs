//! Rewrites foreign-key style header names (`Person.id`, `Person.id.1`) into role names.
//!
//! Tables describing a directed relation between two entities of the same kind carry two
//! id columns (`Person.id`, `Person.id.1`); the second becomes `<stem>from` and the first
//! `<stem>to`. Tables with only plain id columns get `<stem>id`. Whether a table has a
//! two-part column is decided once for the whole table.

use rustc_hash::FxHashMap;

const TWO_PART_SUFFIX: &str = ".id.1";
const PLAIN_SUFFIX: &str = ".id";

/// Renames repeated header names so every column is addressable: the second
/// occurrence of `Person.id` becomes `Person.id.1`, the third `Person.id.2`.
pub fn disambiguate<S: AsRef<str>>(columns: &[S]) -> Vec<String> {
    let mut seen: FxHashMap<&str, usize> = FxHashMap::default();
    columns
        .iter()
        .map(|c| {
            let name = c.as_ref();
            let count = seen.entry(name).or_insert(0);
            let out = match *count {
                0 => name.to_string(),
                n => format!("{name}.{n}"),
            };
            *count += 1;
            out
        })
        .collect()
}

/// Canonical names for `columns`, one-to-one and in the same order.
pub fn canonicalize<S: AsRef<str>>(columns: &[S]) -> Vec<String> {
    let has_two_part = columns
        .iter()
        .any(|c| c.as_ref().ends_with(TWO_PART_SUFFIX));

    columns
        .iter()
        .map(|c| canonical_name(c.as_ref(), has_two_part))
        .collect()
}

fn canonical_name(column: &str, has_two_part: bool) -> String {
    if let Some(stem) = column.strip_suffix(TWO_PART_SUFFIX) {
        format!("{}from", stem.to_lowercase())
    } else if let Some(stem) = column.strip_suffix(PLAIN_SUFFIX) {
        let role = if has_two_part { "to" } else { "id" };
        format!("{}{role}", stem.to_lowercase())
    } else {
        column.to_string()
    }
}
