/// Seam for SDL-backed window/renderer setup. `station-cli` passes
/// `Box<dyn SdlContext>` through `FsmContext`-adjacent plugin arguments
/// without the concurrency core depending on a windowing crate; no
/// repository in the retrieval pack imports `sdl2`, so the `sdl` feature
/// compiles only this trait plus a no-op backend rather than fabricate
/// grounding for a real one.
pub trait SdlContext: Send {
    fn window_title(&self) -> &str;
    fn texture_size(&self) -> (u16, u16);
}

/// A backend that satisfies [`SdlContext`] without creating a window.
pub struct NullSdlContext {
    title: String,
    size: (u16, u16),
}

impl NullSdlContext {
    pub fn new(title: impl Into<String>, size: (u16, u16)) -> Self {
        Self {
            title: title.into(),
            size,
        }
    }
}

impl SdlContext for NullSdlContext {
    fn window_title(&self) -> &str {
        &self.title
    }

    fn texture_size(&self) -> (u16, u16) {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_context_reports_back_what_it_was_given() {
        let ctx = NullSdlContext::new("demo", (640, 480));
        assert_eq!(ctx.window_title(), "demo");
        assert_eq!(ctx.texture_size(), (640, 480));
    }
}
