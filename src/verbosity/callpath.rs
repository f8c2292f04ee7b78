//! Call-path capture and normalization.
//!
//! A call path is built from an ordered list of [`Frame`]s, outermost first.
//! Frames whose scope starts with an excluded prefix (the runtime, the async
//! executor, this crate) are dropped; the rest are lower-cased and joined
//! with `.`.

use crate::error::{ControlError, Result};
use std::backtrace::Backtrace;
use std::sync::Arc;

/// Scopes excluded from every call path.
pub const DEFAULT_EXCLUDED_SCOPES: &[&str] = &[
    "std",
    "core",
    "alloc",
    "tokio",
    "futures",
    "tracing",
    "test",
    "hotswap_verbosity",
    "__rust",
    "rust_begin_unwind",
    "rust_panic",
    "main",
    "__libc",
    "_start",
];

/// One entry of a captured call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Enclosing scope, e.g. `orders::import::Importer`
    pub scope: String,
    /// Function or method name, e.g. `run`
    pub member: String,
}

impl Frame {
    /// Build a frame from a scope and member name.
    pub fn new(scope: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            member: member.into(),
        }
    }

    /// Split a demangled Rust symbol such as `a::b::C::run` into a frame.
    ///
    /// Trait-impl segments like `<a::B as c::D>::run` keep the implementing
    /// type. Closure markers and hash suffixes are dropped.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let symbol = strip_hash(symbol.trim());
        let symbol = match symbol.strip_prefix('<') {
            Some(rest) => {
                let (ty, tail) = rest.split_once('>')?;
                let ty = ty.split(" as ").next().unwrap_or(ty);
                format!("{}{}", ty, tail)
            }
            None => symbol.to_string(),
        };

        let segments: Vec<&str> = symbol
            .split("::")
            .map(strip_generics)
            .filter(|s| !s.is_empty() && !s.starts_with("{{"))
            .collect();

        match segments.split_last() {
            Some((member, scope)) if !scope.is_empty() => {
                Some(Frame::new(scope.join("::"), *member))
            }
            Some((member, _)) => Some(Frame::new("", *member)),
            None => None,
        }
    }

    fn normalized(&self) -> String {
        let scope = self.scope.replace("::", ".").to_lowercase();
        let member = self.member.to_lowercase();
        if scope.is_empty() {
            member
        } else {
            format!("{}.{}", scope, member)
        }
    }
}

fn strip_hash(symbol: &str) -> &str {
    match symbol.rsplit_once("::h") {
        Some((head, hash)) if hash.len() == 16 && hash.chars().all(|c| c.is_ascii_hexdigit()) => {
            head
        }
        _ => symbol,
    }
}

fn strip_generics(segment: &str) -> &str {
    segment.split('<').next().unwrap_or(segment).trim()
}

/// Supplies the frames of the current call chain.
///
/// Frames are returned innermost first, the way stack walkers report them.
pub trait FrameSource: Send + Sync {
    /// Capture the current call chain.
    fn capture(&self) -> Result<Vec<Frame>>;
}

/// Captures frames with [`std::backtrace::Backtrace`].
///
/// Symbol names require the binary to keep its symbol table. Inlined
/// functions do not appear as separate frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct BacktraceFrames;

impl FrameSource for BacktraceFrames {
    fn capture(&self) -> Result<Vec<Frame>> {
        let rendered = Backtrace::force_capture().to_string();
        let frames = parse_backtrace(&rendered);
        if frames.is_empty() {
            return Err(ControlError::Resolution(
                "backtrace contained no symbolized frames".to_string(),
            ));
        }
        Ok(frames)
    }
}

/// Parse the rendered form of a [`Backtrace`], innermost frame first.
pub(crate) fn parse_backtrace(rendered: &str) -> Vec<Frame> {
    rendered
        .lines()
        .filter_map(|line| {
            let (index, symbol) = line.trim().split_once(": ")?;
            if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            Frame::from_symbol(symbol)
        })
        .collect()
}

/// A fixed call chain, for hosts that track scopes themselves and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticFrames {
    frames: Vec<Frame>,
}

impl StaticFrames {
    /// Frames innermost first.
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    /// Build from a dotted path such as `X.Foo.Bar.Baz`, outermost first.
    ///
    /// The whole path becomes a single frame whose member is the last segment.
    pub fn from_path(path: &str) -> Self {
        let frame = match path.rsplit_once('.') {
            Some((scope, member)) => Frame::new(scope.replace('.', "::"), member),
            None => Frame::new("", path),
        };
        Self::new(vec![frame])
    }
}

impl FrameSource for StaticFrames {
    fn capture(&self) -> Result<Vec<Frame>> {
        Ok(self.frames.clone())
    }
}

impl<F: FrameSource + ?Sized> FrameSource for Arc<F> {
    fn capture(&self) -> Result<Vec<Frame>> {
        (**self).capture()
    }
}

/// Build the normalized call path from frames reported innermost first.
///
/// `excluded` holds scope prefixes compared case-insensitively on `::` or `.`
/// boundaries.
pub fn normalize(frames: &[Frame], excluded: &[String]) -> String {
    frames
        .iter()
        .rev()
        .filter(|frame| !is_excluded(frame, excluded))
        .map(Frame::normalized)
        .collect::<Vec<_>>()
        .join(".")
}

fn is_excluded(frame: &Frame, excluded: &[String]) -> bool {
    let scope = frame.scope.replace("::", ".").to_lowercase();
    let full = if scope.is_empty() {
        frame.member.to_lowercase()
    } else {
        scope
    };

    excluded.iter().any(|prefix| {
        let prefix = prefix.as_str();
        full == prefix
            || (full.starts_with(prefix) && full[prefix.len()..].starts_with('.'))
            || (prefix.starts_with('_') && full.starts_with(prefix))
    })
}

/// Lower-case scope prefixes and convert `::` to `.` for [`normalize`].
pub fn normalize_scopes<I, S>(scopes: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    scopes
        .into_iter()
        .map(|s| s.as_ref().trim().replace("::", ".").to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
