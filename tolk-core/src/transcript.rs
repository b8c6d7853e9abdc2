/// One recognition event. Interim fragments are provisional and may be
/// revised by a later event in the same session; final fragments are
/// immutable once emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    pub is_final: bool,
}

impl Fragment {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn finalized(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Assembles the best-effort transcript from a stream of fragments.
///
/// The emitted value is always: all finalized fragments, in arrival order,
/// followed by the most recent still-pending interim fragment. A final
/// fragment replaces the pending interim rather than appending to it, since
/// a fragment stream can revise its own tail before finalizing.
#[derive(Debug, Clone, Default)]
pub struct TranscriptAccumulator {
    finals: Vec<String>,
    interim: Option<String>,
}

impl TranscriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, fragment: &Fragment) {
        if fragment.is_final {
            let text = fragment.text.trim();
            if !text.is_empty() {
                self.finals.push(text.to_string());
            }
            self.interim = None;
        } else {
            self.interim = Some(fragment.text.clone());
        }
    }

    /// Drops a pending interim fragment without promoting it. Stopping a
    /// session never synthesizes finality; only the recognition source can
    /// finalize its own tail.
    pub fn discard_interim(&mut self) {
        self.interim = None;
    }

    pub fn reset(&mut self) {
        self.finals.clear();
        self.interim = None;
    }

    pub fn is_empty(&self) -> bool {
        self.finals.is_empty() && self.interim.as_deref().map_or(true, |s| s.trim().is_empty())
    }

    pub fn text(&self) -> String {
        let mut out = self.finals.join(" ");
        if let Some(interim) = self.interim.as_deref() {
            let interim = interim.trim();
            if !interim.is_empty() {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(interim);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interim_revises_its_own_tail() {
        let mut acc = TranscriptAccumulator::new();
        acc.apply(&Fragment::interim("Hel"));
        assert_eq!(acc.text(), "Hel");
        acc.apply(&Fragment::interim("Hello"));
        assert_eq!(acc.text(), "Hello");
        acc.apply(&Fragment::finalized("Hello world"));
        assert_eq!(acc.text(), "Hello world");
    }

    #[test]
    fn finals_accumulate_in_arrival_order() {
        let mut acc = TranscriptAccumulator::new();
        acc.apply(&Fragment::finalized("one"));
        acc.apply(&Fragment::finalized("two"));
        acc.apply(&Fragment::interim("thr"));
        assert_eq!(acc.text(), "one two thr");
        acc.apply(&Fragment::finalized("three"));
        assert_eq!(acc.text(), "one two three");
    }

    #[test]
    fn discard_interim_keeps_finals_only() {
        let mut acc = TranscriptAccumulator::new();
        acc.apply(&Fragment::finalized("Hello"));
        acc.apply(&Fragment::interim("wor"));
        acc.discard_interim();
        assert_eq!(acc.text(), "Hello");
    }

    #[test]
    fn empty_and_whitespace_fragments_do_not_pollute_output() {
        let mut acc = TranscriptAccumulator::new();
        acc.apply(&Fragment::finalized("  "));
        acc.apply(&Fragment::interim("   "));
        assert_eq!(acc.text(), "");
        assert!(acc.is_empty());
        acc.apply(&Fragment::finalized(" hello "));
        assert_eq!(acc.text(), "hello");
        assert!(!acc.is_empty());
    }

    #[test]
    fn reset_clears_everything() {
        let mut acc = TranscriptAccumulator::new();
        acc.apply(&Fragment::finalized("hello"));
        acc.apply(&Fragment::interim("wor"));
        acc.reset();
        assert_eq!(acc.text(), "");
        assert!(acc.is_empty());
    }
}
