//! Full Page Render
//!
//! Wraps a top-level render function as a complete HTML document that the
//! client runtime can bootstrap from.
//!
//! The body is built once, on first render, and reused afterwards: the
//! fragments inside it are what later batches patch, so their keys must
//! stay stable across page fetches. Each render embeds the session token,
//! the endpoint locations and the current cursor.

use std::sync::{Arc, OnceLock};

use serde::Serialize;

use crate::error::Result;
use crate::markup::tags::{body, head, html, script};
use crate::markup::{AttrValue, Child};
use crate::reactive::{Markup, RenderFn, Runtime};

/// Extra document content around the tracked body.
#[derive(Debug, Clone, Default)]
pub struct PageOptions {
    pub head: Vec<Child>,
    pub body_attrs: Vec<(String, AttrValue)>,
}

impl PageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_head(mut self, element: impl Into<Child>) -> Self {
        self.head.push(element.into());
        self
    }

    pub fn with_body_attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.body_attrs.push((name.into(), value.into()));
        self
    }
}

/// Configuration handed to the client runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientBootstrap<'a> {
    pub session: &'a str,
    pub state: u64,
    pub mutate: &'a str,
    pub sync: &'a str,
    pub log: &'a str,
}

pub struct Page {
    runtime: Runtime,
    options: PageOptions,
    render: RenderFn,
    body: OnceLock<Markup>,
}

impl Page {
    pub(crate) fn new(runtime: Runtime, options: PageOptions, render: RenderFn) -> Self {
        Self {
            runtime,
            options,
            render,
            body: OnceLock::new(),
        }
    }

    /// The `<body>` container, built on first access.
    pub fn body(&self) -> &Markup {
        self.body.get_or_init(|| {
            let render = Arc::clone(&self.render);
            let fragment = self.runtime.track(move || render());
            body()
                .child(fragment)
                .attrs(self.options.body_attrs.iter().cloned())
                .build()
        })
    }

    /// Render the full document.
    ///
    /// Pending invalidations are flushed first so the embedded cursor
    /// matches the content served.
    pub fn render(&self) -> Result<String> {
        let body = self.body().clone();
        self.runtime.flush();
        let state = self.runtime.tip();

        let endpoints = &self.runtime.config().endpoints;
        let bootstrap = ClientBootstrap {
            session: self.runtime.session().as_str(),
            state,
            mutate: &endpoints.mutate,
            sync: &endpoints.sync,
            log: &endpoints.log,
        };
        let json = serde_json::to_string(&bootstrap)?.replace("</", "<\\/");

        let document = html()
            .child(
                head()
                    .child(script().child(format!("window.tessera = {};", json)))
                    .child(script().attr("src", endpoints.client_script.as_str()))
                    .children(self.options.head.iter().cloned()),
            )
            .child(body)
            .build();

        Ok(format!("<!DOCTYPE html>{}", document.to_html()))
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("built", &self.body.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::tags::{div, title};
    use crate::reactive::Cell;

    fn body_key(document: &str) -> String {
        let start = document.find("<body key=\"").expect("body carries a key") + 11;
        let end = document[start..].find('"').expect("closing quote") + start;
        document[start..end].to_string()
    }

    #[test]
    fn body_key_is_stable_across_renders() {
        let runtime = Runtime::default();
        let value = Cell::new(String::from("str"));

        let page = {
            let runtime_inner = runtime.clone();
            let value = value.clone();
            runtime.page(PageOptions::new(), move || {
                let value = value.clone();
                div().child(runtime_inner.track(move || value.get())).build()
            })
        };

        let first = page.render().unwrap();
        let second = page.render().unwrap();
        assert_eq!(body_key(&first), body_key(&second));
        assert!(first.starts_with("<!DOCTYPE html><html><head><script>window.tessera = "));
    }

    #[test]
    fn render_embeds_session_and_cursor() {
        let runtime = Runtime::default();
        let value = Cell::new(0);

        let page = {
            let runtime_inner = runtime.clone();
            let value = value.clone();
            runtime.page(
                PageOptions::new().with_head(title().child("Clock")),
                move || {
                    let value = value.clone();
                    div().child(runtime_inner.track(move || value.get().to_string())).build()
                },
            )
        };

        let document = page.render().unwrap();
        assert!(document.contains(&format!("\"session\":\"{}\"", runtime.session())));
        assert!(document.contains("\"state\":0"));
        assert!(document.contains("<script src=\"&#x2f;tessera.js\"></script>"));
        assert!(document.contains("<title>Clock</title>"));

        value.set(1);
        let document = page.render().unwrap();
        assert!(document.contains("\"state\":1"));
        assert!(document.contains(">1</div>"));
    }

    #[test]
    fn reactive_attribute_updates_in_page() {
        let runtime = Runtime::default();
        let klass = Cell::new(String::new());

        let page = {
            let runtime_inner = runtime.clone();
            let klass = klass.clone();
            runtime.page(PageOptions::new(), move || {
                let klass = klass.clone();
                div()
                    .child("hi")
                    .attr("Class", runtime_inner.track(move || klass.get()))
                    .build()
            })
        };

        assert!(page.render().unwrap().contains("<div Class=\"\" key="));
        klass.set(String::from("new class"));
        assert!(page.render().unwrap().contains("<div Class=\"new class\" key="));
    }

    #[test]
    fn body_attrs_are_applied() {
        let runtime = Runtime::default();
        let page = runtime.page(
            PageOptions::new().with_body_attr("class", "dark"),
            || div().child("static").build(),
        );

        let document = page.render().unwrap();
        assert!(document.contains("<body class=\"dark\" key=\""));
    }
}
