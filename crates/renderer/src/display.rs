use image::RgbaImage;

/// Which point of a render a presented canvas belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Stitched canvas after `completed` of `total` tiles.
    Progress { completed: usize, total: usize },
    /// Every tile has been composited.
    Stitched,
    /// Cropped and packed output.
    Final,
}

/// Receives intermediate canvases for progressive display.
pub trait DisplaySink {
    fn present(&mut self, frame: Frame, canvas: &RgbaImage);
}

/// Discards every frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullDisplay;

impl DisplaySink for NullDisplay {
    fn present(&mut self, _frame: Frame, _canvas: &RgbaImage) {}
}

impl<F> DisplaySink for F
where
    F: FnMut(Frame, &RgbaImage),
{
    fn present(&mut self, frame: Frame, canvas: &RgbaImage) {
        self(frame, canvas)
    }
}
