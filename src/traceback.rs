use std::backtrace::Backtrace;
use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};

/// One resolved frame of a captured call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub function: String,
    pub file_name: Option<String>,
    pub line_number: Option<u32>,
}

impl StackFrame {
    pub fn new(function: impl Into<String>, file_name: impl Into<String>, line_number: u32) -> Self {
        StackFrame {
            function: function.into(),
            file_name: Some(file_name.into()),
            line_number: Some(line_number),
        }
    }
}

/// A call stack, innermost (most recent) frame first, together with its
/// rendered text.
///
/// A captured stack is symbolized and parsed the first time its frames or
/// text are read. Cloning is cheap; clones share the rendering.
#[derive(Debug, Clone)]
pub struct Traceback {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    backtrace: Option<Backtrace>,
    rendered: OnceLock<Rendered>,
}

#[derive(Debug)]
struct Rendered {
    frames: Vec<StackFrame>,
    text: String,
}

impl Traceback {
    /// Capture the current call stack regardless of `RUST_BACKTRACE`.
    ///
    /// Without debug info the frames carry no file names and the rendered
    /// text is whatever the standard library prints for such stacks.
    pub fn capture() -> Self {
        Traceback {
            inner: Arc::new(Inner {
                backtrace: Some(Backtrace::force_capture()),
                rendered: OnceLock::new(),
            }),
        }
    }

    /// Build a traceback from explicit frames, innermost first.
    pub fn from_frames(frames: Vec<StackFrame>) -> Self {
        let mut text = String::new();
        for (idx, frame) in frames.iter().enumerate() {
            let _ = writeln!(text, "{idx:>4}: {}", frame.function);
            if let Some(file) = &frame.file_name {
                match frame.line_number {
                    Some(line) => {
                        let _ = writeln!(text, "             at {file}:{line}");
                    }
                    None => {
                        let _ = writeln!(text, "             at {file}");
                    }
                }
            }
        }
        Traceback::rendered(frames, text)
    }

    fn rendered(frames: Vec<StackFrame>, text: String) -> Self {
        Traceback {
            inner: Arc::new(Inner {
                backtrace: None,
                rendered: OnceLock::from(Rendered { frames, text }),
            }),
        }
    }

    fn render(&self) -> &Rendered {
        self.inner.rendered.get_or_init(|| {
            let text = self
                .inner
                .backtrace
                .as_ref()
                .map(|bt| bt.to_string())
                .unwrap_or_default();
            Rendered {
                frames: parse_frames(&text),
                text,
            }
        })
    }

    pub fn frames(&self) -> &[StackFrame] {
        &self.render().frames
    }

    pub fn text(&self) -> &str {
        &self.render().text
    }
}

/// Parse the `Display` output of [`Backtrace`] into frames.
///
/// Each frame is a symbol line (`  3: crate::module::function`, inlined
/// symbols come without the index) optionally followed by an
/// `at path:line:column` line.
fn parse_frames(text: &str) -> Vec<StackFrame> {
    let mut frames: Vec<StackFrame> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(location) = line.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut() {
                let (file, line_number) = split_location(location);
                frame.file_name = Some(file.to_string());
                frame.line_number = line_number;
            }
            continue;
        }

        let function = match line.split_once(": ") {
            Some((idx, rest)) if idx.chars().all(|c| c.is_ascii_digit()) => rest,
            _ => line,
        };
        frames.push(StackFrame {
            function: function.to_string(),
            file_name: None,
            line_number: None,
        });
    }

    frames
}

/// Split `path:line:column` (or `path:line`) into path and line.
fn split_location(location: &str) -> (&str, Option<u32>) {
    let mut parts = location.rsplitn(3, ':');
    let last = parts.next();
    let middle = parts.next();
    let rest = parts.next();

    match (rest, middle, last) {
        (Some(path), Some(line), Some(_column)) if line.parse::<u32>().is_ok() => {
            (path, line.parse().ok())
        }
        _ => match location.rsplit_once(':') {
            Some((path, line)) if line.parse::<u32>().is_ok() => (path, line.parse().ok()),
            _ => (location, None),
        },
    }
}

/// Path markers of frames that never count as the error origin: vendored
/// dependencies, the standard library and this crate.
pub const DEFAULT_FRAME_MARKERS: &[&str] = &[
    "/.cargo/registry/",
    "/.cargo/git/",
    "/rustc/",
    concat!("/", env!("CARGO_PKG_NAME"), "/src/"),
    concat!(env!("CARGO_MANIFEST_DIR"), "/src/"),
];

/// Chooses the frame reported as the origin of an error.
///
/// A frame is skipped when its path contains one of the markers or its
/// symbol lives in this crate.
#[derive(Debug, Clone)]
pub struct FrameFilter {
    markers: Vec<String>,
    skip_own_symbols: bool,
}

impl Default for FrameFilter {
    fn default() -> Self {
        FrameFilter {
            markers: DEFAULT_FRAME_MARKERS.iter().map(|m| m.to_string()).collect(),
            skip_own_symbols: true,
        }
    }
}

impl FrameFilter {
    /// A filter that accepts every frame with a file.
    pub fn empty() -> Self {
        FrameFilter {
            markers: Vec::new(),
            skip_own_symbols: false,
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.markers.push(marker.into());
        self
    }

    pub fn is_library(&self, path: &str) -> bool {
        let path = path.replace('\\', "/");
        self.markers.iter().any(|m| path.contains(m.as_str()))
    }

    fn is_own_symbol(&self, function: &str) -> bool {
        self.skip_own_symbols
            && function
                .trim_start_matches('<')
                .starts_with(concat!(env!("CARGO_CRATE_NAME"), "::"))
    }

    /// Innermost frame that has a file outside the marked directories.
    pub fn select<'a>(&self, traceback: &'a Traceback) -> Option<&'a StackFrame> {
        traceback.frames().iter().find(|frame| match &frame.file_name {
            Some(path) => !self.is_library(path) && !self.is_own_symbol(&frame.function),
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "   0: std::backtrace::Backtrace::force_capture
             at /rustc/abc123/library/std/src/backtrace.rs:312:9
   1: synchrolog_axum::traceback::Traceback::capture
             at /home/dev/synchrolog-axum/src/traceback.rs:40:20
   2: shop::handlers::checkout
             at ./src/handlers.rs:88:13
      shop::handlers::checkout::{{closure}}
             at ./src/handlers.rs:80:5
   3: tokio::runtime::task::core::Core<T,S>::poll
             at /home/dev/.cargo/registry/src/index.crates.io-6f17d22bba15001f/tokio-1.40.0/src/runtime/task/core.rs:331:17
   4: <unknown>
";

    #[test]
    fn parses_std_backtrace_output() {
        let frames = parse_frames(SAMPLE);
        assert_eq!(frames.len(), 6);
        assert_eq!(frames[2].function, "shop::handlers::checkout");
        assert_eq!(frames[2].file_name.as_deref(), Some("./src/handlers.rs"));
        assert_eq!(frames[2].line_number, Some(88));
        assert_eq!(frames[3].function, "shop::handlers::checkout::{{closure}}");
        assert_eq!(frames[3].line_number, Some(80));
        assert_eq!(frames[5].file_name, None);
    }

    #[test]
    fn selection_skips_std_dependencies_and_self() {
        let tb = Traceback::rendered(parse_frames(SAMPLE), SAMPLE.to_string());
        let frame = FrameFilter::default().select(&tb).expect("user frame");
        assert_eq!(frame.file_name.as_deref(), Some("./src/handlers.rs"));
        assert_eq!(frame.line_number, Some(88));
    }

    #[test]
    fn selection_is_none_when_every_frame_is_library_code() {
        let tb = Traceback::from_frames(vec![
            StackFrame::new("std::rt::lang_start", "/rustc/abc/library/std/src/rt.rs", 10),
            StackFrame::new(
                "hyper::proto::h1::dispatch",
                "/root/.cargo/registry/src/hyper-1.4.0/src/proto/h1/dispatch.rs",
                20,
            ),
        ]);
        assert!(FrameFilter::default().select(&tb).is_none());
    }

    #[test]
    fn custom_markers_extend_the_defaults() {
        let tb = Traceback::from_frames(vec![
            StackFrame::new("app::vendor::thing", "/srv/app/vendor/thing.rs", 3),
            StackFrame::new("app::main", "/srv/app/src/main.rs", 7),
        ]);
        let filter = FrameFilter::default().with_marker("/vendor/");
        let frame = filter.select(&tb).expect("frame");
        assert_eq!(frame.function, "app::main");
    }

    #[test]
    fn own_symbols_are_skipped_whatever_the_path() {
        let tb = Traceback::from_frames(vec![
            StackFrame::new(
                "<synchrolog_axum::layer::SynchrologLayer as tracing_subscriber::layer::Layer<S>>::on_event",
                "./src/layer.rs",
                120,
            ),
            StackFrame::new("shop::checkout", "./src/checkout.rs", 14),
        ]);
        let frame = FrameFilter::default().select(&tb).expect("frame");
        assert_eq!(frame.function, "shop::checkout");
        assert_eq!(FrameFilter::empty().select(&tb).unwrap().line_number, Some(120));
    }

    #[test]
    fn locations_without_column_are_understood() {
        assert_eq!(split_location("src/main.rs:12"), ("src/main.rs", Some(12)));
        assert_eq!(split_location("C:\\app\\src\\main.rs:12:4"), ("C:\\app\\src\\main.rs", Some(12)));
        assert_eq!(split_location("weird"), ("weird", None));
    }

    #[test]
    fn rendered_frames_round_trip_through_the_parser() {
        let tb = Traceback::from_frames(vec![StackFrame::new("app::run", "src/app.rs", 42)]);
        assert!(tb.text().contains("at src/app.rs:42"));
        assert_eq!(parse_frames(tb.text()), tb.frames().to_vec());
    }

    #[test]
    fn captured_traceback_has_text() {
        let tb = Traceback::capture();
        assert!(!tb.text().is_empty());
    }

    #[test]
    fn capture_defers_rendering_until_read() {
        let tb = Traceback::capture();
        let clone = tb.clone();
        assert!(tb.inner.rendered.get().is_none());

        let text = clone.text().to_string();
        assert!(tb.inner.rendered.get().is_some());
        assert_eq!(tb.text(), text);
    }
}
