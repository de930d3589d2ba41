//! A MapReduce-compatible implementation of `grep`.
//!
//! The auxiliary argument is the search term. Every matching line becomes
//! one key, `file:line_no`, so the output lists each match once.

use crate::*;
use anyhow::{bail, Result};

pub fn map(kv: KeyValue, aux: &str) -> MapOutput {
    let term = aux.trim();
    if term.is_empty() {
        bail!("grep needs a search term");
    }

    let file = kv.key;
    let matches = kv
        .value
        .lines()
        .enumerate()
        .filter(|(_, line)| line.contains(term))
        .map(|(i, line)| Ok::<_, anyhow::Error>(KeyValue::new(format!("{}:{}", file, i + 1), line)))
        .collect::<Vec<_>>();
    Ok(Box::new(matches.into_iter()))
}

pub fn reduce(key: &str, mut values: Box<dyn Iterator<Item = String> + '_>, _aux: &str) -> Result<String> {
    // Re-executed map attempts emit the same line again; any copy will do.
    match values.next() {
        Some(line) => Ok(line),
        None => bail!("no line recorded for {key}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_one_key_per_matching_line() {
        let kv = KeyValue::new("notes.txt", "alpha beta\ngamma\nbeta again");
        let out: Vec<KeyValue> = map(kv, "beta").unwrap().map(Result::unwrap).collect();
        assert_eq!(
            out,
            vec![
                KeyValue::new("notes.txt:1", "alpha beta"),
                KeyValue::new("notes.txt:3", "beta again"),
            ]
        );
    }

    #[test]
    fn requires_a_term() {
        assert!(map(KeyValue::new("f", "x"), "  ").is_err());
    }

    #[test]
    fn reduce_keeps_a_line() {
        let values = vec!["beta again".to_string(), "beta again".to_string()];
        assert_eq!(
            reduce("notes.txt:3", Box::new(values.into_iter()), "beta").unwrap(),
            "beta again"
        );
    }
}
