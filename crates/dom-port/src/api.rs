use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::DomError;
use crate::model::{ElementHandle, LayoutInfo, Viewport};

/// Read-only capability interface onto the host document.
///
/// The grading engine consumes the page exclusively through this port:
/// query elements by selector, read computed style / attributes / layout
/// boxes, and await one-shot custom events. No method mutates the page.
#[async_trait]
pub trait DomPort: Send + Sync {
    /// All elements matching a CSS selector, in document order.
    async fn query(&self, selector: &str) -> Result<Vec<ElementHandle>, DomError>;

    /// All descendants of `scope` matching a CSS selector, in document order.
    async fn query_within(
        &self,
        scope: ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DomError>;

    async fn inner_html(&self, el: ElementHandle) -> Result<String, DomError>;

    /// Attribute value, or `None` when the attribute is absent.
    async fn attribute(&self, el: ElementHandle, name: &str)
        -> Result<Option<String>, DomError>;

    /// Arbitrary element property, or `None` when unset.
    async fn property(&self, el: ElementHandle, key: &str) -> Result<Option<Value>, DomError>;

    /// Computed CSS property value, or `None` when unresolvable.
    async fn computed_style(
        &self,
        el: ElementHandle,
        property: &str,
    ) -> Result<Option<String>, DomError>;

    async fn layout(&self, el: ElementHandle) -> Result<LayoutInfo, DomError>;

    /// Index of the element among its parent's element children, or
    /// `None` for a parentless element.
    async fn child_index(&self, el: ElementHandle) -> Result<Option<usize>, DomError>;

    async fn viewport(&self) -> Result<Viewport, DomError>;

    async fn user_agent(&self) -> Result<String, DomError>;

    async fn device_pixel_ratio(&self) -> Result<f64, DomError>;

    /// Wait for a named custom event to fire once; resolves with the
    /// event's detail payload. Unbounded wait, resolves at most once.
    async fn wait_event(&self, name: &str) -> Result<Value, DomError>;
}

#[async_trait]
impl<D> DomPort for Arc<D>
where
    D: DomPort + ?Sized,
{
    async fn query(&self, selector: &str) -> Result<Vec<ElementHandle>, DomError> {
        (**self).query(selector).await
    }

    async fn query_within(
        &self,
        scope: ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DomError> {
        (**self).query_within(scope, selector).await
    }

    async fn inner_html(&self, el: ElementHandle) -> Result<String, DomError> {
        (**self).inner_html(el).await
    }

    async fn attribute(
        &self,
        el: ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DomError> {
        (**self).attribute(el, name).await
    }

    async fn property(&self, el: ElementHandle, key: &str) -> Result<Option<Value>, DomError> {
        (**self).property(el, key).await
    }

    async fn computed_style(
        &self,
        el: ElementHandle,
        property: &str,
    ) -> Result<Option<String>, DomError> {
        (**self).computed_style(el, property).await
    }

    async fn layout(&self, el: ElementHandle) -> Result<LayoutInfo, DomError> {
        (**self).layout(el).await
    }

    async fn child_index(&self, el: ElementHandle) -> Result<Option<usize>, DomError> {
        (**self).child_index(el).await
    }

    async fn viewport(&self) -> Result<Viewport, DomError> {
        (**self).viewport().await
    }

    async fn user_agent(&self) -> Result<String, DomError> {
        (**self).user_agent().await
    }

    async fn device_pixel_ratio(&self) -> Result<f64, DomError> {
        (**self).device_pixel_ratio().await
    }

    async fn wait_event(&self, name: &str) -> Result<Value, DomError> {
        (**self).wait_event(name).await
    }
}
