//! Path templating for outbound callback URLs.
//!
//! Templates use `{{NAME}}` placeholders. Substituted values are treated as
//! opaque path segments and percent-encoded. [`render_url`] additionally parses
//! the result and refuses values the URL parser would reinterpret, such as the
//! dot segments `.` and `..`, so an identifier can never change the shape of
//! the produced URL.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use url::Url;

use crate::error::{Error, Result};

/// Characters that must be escaped inside a single path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Path parameters of an inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    /// The `{ID}` segment, usually the account request identifier.
    pub id: Option<String>,
    /// The `{SignedChallenge}` segment of the accounts lookup.
    pub signed_challenge: Option<String>,
}

impl PathParams {
    /// Parameters carrying only an identifier.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            signed_challenge: None,
        }
    }

    /// Adds a signed challenge token.
    pub fn signed_challenge(mut self, token: impl Into<String>) -> Self {
        self.signed_challenge = Some(token.into());
        self
    }

    /// Looks up a placeholder value by its template name.
    pub fn get(&self, name: &str) -> Option<&str> {
        match name {
            "ID" => self.id.as_deref(),
            "SignedChallenge" => self.signed_challenge.as_deref(),
            _ => None,
        }
    }
}

/// Renders `template`, replacing every `{{NAME}}` with the matching parameter.
///
/// Unknown names and absent parameters render as the empty string. Text outside
/// placeholders, including an unterminated `{{`, is copied unchanged.
pub fn render(template: &str, params: &PathParams) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        rendered.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            rendered.push_str(&rest[start..]);
            return rendered;
        };

        if let Some(value) = params.get(after[..end].trim()) {
            rendered.extend(utf8_percent_encode(value, PATH_SEGMENT));
        }
        rest = &after[end + 2..];
    }

    rendered.push_str(rest);
    rendered
}

/// Renders `template` onto `base` and checks the result is a well-formed URL
/// whose path still ends with the rendered template.
///
/// The values `.` and `..` are dot segments that URL parsers normalize away,
/// which would move the request to a different path. They are rejected.
pub fn render_url(base: &str, template: &str, params: &PathParams) -> Result<String> {
    let path = render(template, params);
    let rendered = format!("{}{}", base, path);

    let parsed = Url::parse(&rendered)
        .map_err(|e| Error::InvalidUrl(format!("Invalid callback URL {}: {}", rendered, e)))?;
    if !parsed.path().ends_with(&path) {
        return Err(Error::InvalidUrl(format!(
            "Path parameters of {} would resolve to {}",
            template,
            parsed.path()
        )));
    }
    Ok(rendered)
}
