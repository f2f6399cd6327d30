use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of leading characters inspected for a mode marker.
pub const DEFAULT_PROBE_CHARS: usize = 200;

const CANVAS_MARKER: &str = "// mode: canvas";
const SCENE_MARKERS: [&str; 2] = ["// mode: three.js", "// mode: threejs"];

/// Rendering backend a snippet targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Immediate-mode 2D drawing on a canvas context.
    #[default]
    Canvas,
    /// Persistent scene graph rendered by the engine after each invocation.
    Scene3d,
}

impl RenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMode::Canvas => "canvas",
            RenderMode::Scene3d => "three.js",
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies `code` using the default probe length.
pub fn detect_mode(code: &str) -> RenderMode {
    detect_mode_within(code, DEFAULT_PROBE_CHARS)
}

/// Classifies `code` by looking for a mode marker among its first
/// `probe_chars` characters (after trimming, case-insensitive). Anything
/// without a marker is a canvas snippet.
pub fn detect_mode_within(code: &str, probe_chars: usize) -> RenderMode {
    let head: String = code
        .trim()
        .chars()
        .take(probe_chars)
        .collect::<String>()
        .to_lowercase();

    if head.contains(CANVAS_MARKER) {
        RenderMode::Canvas
    } else if SCENE_MARKERS.iter().any(|marker| head.contains(marker)) {
        RenderMode::Scene3d
    } else {
        RenderMode::Canvas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_canvas_marker_in_any_case() {
        assert_eq!(detect_mode("// MODE: CANVAS\nctx.fillRect(0,0,1,1);"), RenderMode::Canvas);
        assert_eq!(detect_mode("// mode: canvas"), RenderMode::Canvas);
    }

    #[test]
    fn recognises_both_three_markers() {
        assert_eq!(detect_mode("// MODE: THREE.JS\nscene.clear();"), RenderMode::Scene3d);
        assert_eq!(detect_mode("  // Mode: ThreeJS\n"), RenderMode::Scene3d);
    }

    #[test]
    fn defaults_to_canvas() {
        assert_eq!(detect_mode(""), RenderMode::Canvas);
        assert_eq!(detect_mode("let x = 1;"), RenderMode::Canvas);
        assert_eq!(detect_mode("// mode: webgl"), RenderMode::Canvas);
    }

    #[test]
    fn ignores_markers_past_the_probe_window() {
        let code = format!("{}\n// mode: three.js", " x".repeat(150));
        assert_eq!(detect_mode(&code), RenderMode::Canvas);
        assert_eq!(detect_mode_within(&code, 400), RenderMode::Scene3d);
    }

    #[test]
    fn leading_whitespace_does_not_count_against_the_window() {
        let code = format!("{}// mode: threejs", "\n".repeat(500));
        assert_eq!(detect_mode(&code), RenderMode::Scene3d);
    }

    #[test]
    fn multibyte_input_is_handled() {
        assert_eq!(detect_mode("// 🎵 визуализация\n// mode: three.js"), RenderMode::Scene3d);
    }
}
