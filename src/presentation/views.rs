use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

use crate::application::error::HttpError;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Clone)]
pub struct DirectoryEntryView {
    pub href: String,
    pub label: String,
}

/// Generated listing page for a directory without an `index.html`.
#[derive(Template)]
#[template(path = "directory.html")]
pub struct DirectoryIndexTemplate {
    pub heading: String,
    pub entries: Vec<DirectoryEntryView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_template_renders_links() {
        let template = DirectoryIndexTemplate {
            heading: "/sub".to_string(),
            entries: vec![
                DirectoryEntryView {
                    href: "/sub/nested".to_string(),
                    label: "nested/".to_string(),
                },
                DirectoryEntryView {
                    href: "/sub/app.ts".to_string(),
                    label: "app.ts".to_string(),
                },
            ],
        };

        let html = template.render().expect("render");
        assert!(html.contains("Directory listing for /sub"));
        assert!(html.contains(r#"<a href="/sub/nested">nested/</a>"#));
        assert!(html.contains(r#"<a href="/sub/app.ts">app.ts</a>"#));
    }
}
