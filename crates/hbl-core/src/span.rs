/// Byte range into preprocessed template text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct Span {
    pub lo: u32,
    pub hi: u32,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Span({}-{})", self.lo, self.hi)
    }
}

impl Span {
    pub fn new(lo: usize, hi: usize) -> Span {
        Span {
            lo: lo as u32,
            hi: hi.max(lo) as u32,
        }
    }

    pub fn null() -> Span {
        Span { lo: 0, hi: 0 }
    }

    pub fn len(&self) -> usize {
        (self.hi - self.lo) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.hi == self.lo
    }

    /// 1-based line and column of the span start within `source`.
    pub fn line_col(&self, source: &str) -> (usize, usize) {
        let lo = (self.lo as usize).min(source.len());
        let before = source.get(..lo).unwrap_or(source);
        let line = before.matches('\n').count() + 1;
        let col = before.rfind('\n').map(|nl| lo - nl).unwrap_or(lo + 1);
        (line, col)
    }
}

impl From<Span> for miette::SourceSpan {
    fn from(span: Span) -> Self {
        (span.lo as usize, span.len()).into()
    }
}
