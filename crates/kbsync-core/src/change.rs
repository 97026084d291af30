//! Whole-file change detection.
//!
//! A file is compared to its previously persisted record by size and mtime.
//! Under a hash-confirming mode, a metadata mismatch (or a forced rehash)
//! triggers a content hash; a hash equal to the stored one overrides the
//! verdict to [`Verdict::Unchanged`]. Under [`ChangeDetection::Mtime`] no
//! content is ever read.
//!
//! Hashing is paid only when metadata suggests change. An edit that keeps
//! both size and mtime identical goes unnoticed unless `force_rehash` is set.

use serde::Serialize;

use crate::models::ChangeDetection;

/// Size and mtime observed on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observed {
    pub size_bytes: i64,
    pub mtime_epoch: i64,
}

/// The persisted state a file is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prior<'a> {
    pub size_bytes: i64,
    pub mtime_epoch: i64,
    pub content_hash: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    New,
    Changed,
    Unchanged,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::New => "new",
            Verdict::Changed => "changed",
            Verdict::Unchanged => "unchanged",
        }
    }

    pub fn needs_ingest(&self) -> bool {
        !matches!(self, Verdict::Unchanged)
    }
}

/// A verdict plus the hash computed while reaching it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub verdict: Verdict,
    pub computed_hash: Option<String>,
}

impl Classification {
    /// The hash to persist: a freshly computed one, else the prior one when
    /// the file is known to be unchanged. A change detected without hashing
    /// leaves the content hash unknown.
    pub fn persisted_hash(&self, prior: Option<&Prior<'_>>) -> Option<String> {
        if let Some(hash) = &self.computed_hash {
            return Some(hash.clone());
        }
        match (self.verdict, prior) {
            (Verdict::Unchanged, Some(p)) => p.content_hash.map(str::to_string),
            _ => None,
        }
    }
}

/// Classify a file. `hash_now` is invoked at most once, and only when the
/// mode and metadata call for it.
pub fn classify<E>(
    mode: ChangeDetection,
    force_rehash: bool,
    observed: Observed,
    prior: Option<&Prior<'_>>,
    hash_now: impl FnOnce() -> Result<String, E>,
) -> Result<Classification, E> {
    let is_new = prior.is_none();
    let meta_changed = match prior {
        None => true,
        Some(p) => p.size_bytes != observed.size_bytes || p.mtime_epoch != observed.mtime_epoch,
    };

    let mut verdict = if is_new {
        Verdict::New
    } else if meta_changed {
        Verdict::Changed
    } else {
        Verdict::Unchanged
    };

    let mut computed_hash = None;
    if mode.confirms_with_hash() && (force_rehash || meta_changed) {
        let hash = hash_now()?;
        if let Some(prior_hash) = prior.and_then(|p| p.content_hash) {
            if prior_hash == hash {
                verdict = Verdict::Unchanged;
            }
        }
        computed_hash = Some(hash);
    }

    Ok(Classification {
        verdict,
        computed_hash,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::convert::Infallible;

    use super::*;

    const OBS: Observed = Observed {
        size_bytes: 100,
        mtime_epoch: 1_700_000_000,
    };

    fn prior(hash: Option<&str>) -> Prior<'_> {
        Prior {
            size_bytes: 100,
            mtime_epoch: 1_700_000_000,
            content_hash: hash,
        }
    }

    fn fixed<'a>(
        hash: &'static str,
        calls: &'a Cell<u32>,
    ) -> impl FnOnce() -> Result<String, Infallible> + 'a {
        move || {
            calls.set(calls.get() + 1);
            Ok(hash.to_string())
        }
    }

    #[test]
    fn new_file_is_new_in_every_mode() {
        for mode in [ChangeDetection::Mtime, ChangeDetection::HashConfirmed, ChangeDetection::Auto] {
            let calls = Cell::new(0);
            let c = classify(mode, false, OBS, None, fixed("h1", &calls)).unwrap();
            assert_eq!(c.verdict, Verdict::New);
            assert_eq!(calls.get(), u32::from(mode.confirms_with_hash()));
        }
    }

    #[test]
    fn mtime_mode_never_hashes() {
        let calls = Cell::new(0);
        let p = prior(Some("h1"));
        let observed = Observed {
            size_bytes: 120,
            mtime_epoch: OBS.mtime_epoch + 1,
        };
        let c = classify(ChangeDetection::Mtime, true, observed, Some(&p), fixed("h2", &calls)).unwrap();
        assert_eq!(c.verdict, Verdict::Changed);
        assert_eq!(c.computed_hash, None);
        assert_eq!(c.persisted_hash(Some(&p)), None);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn touched_but_identical_content_is_unchanged_under_auto() {
        let calls = Cell::new(0);
        let p = prior(Some("h1"));
        let touched = Observed {
            mtime_epoch: OBS.mtime_epoch + 60,
            ..OBS
        };
        let c = classify(ChangeDetection::Auto, false, touched, Some(&p), fixed("h1", &calls)).unwrap();
        assert_eq!(c.verdict, Verdict::Unchanged);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn matching_metadata_skips_hash_unless_forced() {
        let p = prior(Some("h1"));

        let calls = Cell::new(0);
        let c = classify(ChangeDetection::HashConfirmed, false, OBS, Some(&p), fixed("h9", &calls)).unwrap();
        assert_eq!(c.verdict, Verdict::Unchanged);
        assert_eq!(calls.get(), 0);
        assert_eq!(c.persisted_hash(Some(&p)).as_deref(), Some("h1"));

        // A forced rehash that finds different bytes keeps the metadata verdict.
        let calls = Cell::new(0);
        let c = classify(ChangeDetection::HashConfirmed, true, OBS, Some(&p), fixed("h9", &calls)).unwrap();
        assert_eq!(c.verdict, Verdict::Unchanged);
        assert_eq!(c.computed_hash.as_deref(), Some("h9"));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn metadata_change_without_prior_hash_stays_changed() {
        let calls = Cell::new(0);
        let p = prior(None);
        let grown = Observed {
            size_bytes: 101,
            ..OBS
        };
        let c = classify(ChangeDetection::Auto, false, grown, Some(&p), fixed("h1", &calls)).unwrap();
        assert_eq!(c.verdict, Verdict::Changed);
    }

    #[test]
    fn hash_failure_propagates() {
        let p = prior(Some("h1"));
        let grown = Observed {
            size_bytes: 101,
            ..OBS
        };
        let result = classify(ChangeDetection::Auto, false, grown, Some(&p), || Err("unreadable"));
        assert_eq!(result, Err("unreadable"));
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let p = prior(Some("h1"));
        let touched = Observed {
            mtime_epoch: 5,
            ..OBS
        };
        let a = classify(ChangeDetection::Auto, false, touched, Some(&p), || Ok::<_, Infallible>("h2".into()));
        let b = classify(ChangeDetection::Auto, false, touched, Some(&p), || Ok::<_, Infallible>("h2".into()));
        assert_eq!(a, b);
    }
}
