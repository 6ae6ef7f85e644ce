use std::fmt;

/// Opaque handle to a live element in the host document. The engine never
/// owns the element; the handle can go stale if the document changes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ElementHandle(pub u64);

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element:{}", self.0)
    }
}

/// The offset box of an element, relative to its offset parent chain.
/// This is what block-layout position checks read.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OffsetBox {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

/// Viewport-relative bounding rectangle. Inline-layout position checks
/// read this instead of the offset box.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ClientRect {
    pub top: f64,
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayoutInfo {
    /// Computed `display` value ("block", "inline", ...).
    pub display: String,
    pub offset: OffsetBox,
    pub rect: ClientRect,
}

impl Default for LayoutInfo {
    fn default() -> Self {
        Self {
            display: "block".to_string(),
            offset: OffsetBox::default(),
            rect: ClientRect::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1024.0,
            height: 768.0,
        }
    }
}
