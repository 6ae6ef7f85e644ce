pub mod api;
pub mod errors;
#[cfg(any(feature = "fixture", test))]
pub mod fixture;
pub mod model;

pub use api::DomPort;
pub use errors::DomError;
#[cfg(any(feature = "fixture", test))]
pub use fixture::FixtureDom;
pub use model::{ClientRect, ElementHandle, LayoutInfo, OffsetBox, Viewport};
