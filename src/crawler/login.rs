//! Form login performed once before a site's first index fetch
//!
//! The login page is fetched, the configured form's hidden inputs are
//! collected and posted back with the credentials. The session cookie lands
//! in the fetcher's cookie store; nothing here holds session state.

use crate::config::LoginConfig;
use crate::crawler::fetcher::{Fetch, FetchRequest};
use crate::extract::Page;
use crate::{ConfigError, ExtractError, ExtractResult, FlipwatchError};
use scraper::{ElementRef, Selector};
use url::Url;

/// Form field names the credentials are posted under
const EMAIL_FIELD: &str = "email";
const PASSWORD_FIELD: &str = "password";

/// Logs in using the credentials named by `login`
///
/// The password is read from the environment variable `login.password_env`.
pub async fn login(fetcher: &dyn Fetch, login: &LoginConfig) -> Result<(), FlipwatchError> {
    let password = std::env::var(&login.password_env)
        .map_err(|_| ConfigError::MissingCredential(login.password_env.clone()))?;
    let url = Url::parse(&login.url)?;

    tracing::info!("Logging in at {}", url);
    let page = fetcher.fetch(&FetchRequest::get(url)).await?;

    let (action, form) = login_form(
        &page.body,
        page.url,
        &login.form_selector,
        &login.email,
        &password,
    )?;

    let response = fetcher
        .fetch(&FetchRequest::post_form(action.clone(), form))
        .await?;
    tracing::info!(
        "Login form posted to {} (HTTP {}, landed on {})",
        action,
        response.status,
        response.url
    );
    Ok(())
}

/// Builds the POST target and body from the login page
///
/// Every named `<input>` of the form is carried over with its current
/// value, then the credential fields are set.
pub fn login_form(
    body: &str,
    page_url: Url,
    form_selector: &str,
    email: &str,
    password: &str,
) -> ExtractResult<(Url, Vec<(String, String)>)> {
    let page = Page::parse(body, page_url);
    let missing = || ExtractError::MissingField {
        field: "login form",
        url: page.url().to_string(),
    };

    let selector = Selector::parse(form_selector).map_err(|_| missing())?;
    let form_element = page.html().select(&selector).next().ok_or_else(missing)?;

    let action = form_element
        .value()
        .attr("action")
        .and_then(|a| page.resolve(a))
        .unwrap_or_else(|| page.url().clone());

    let mut fields: Vec<(String, String)> = inputs(form_element)
        .filter(|(name, _)| name != EMAIL_FIELD && name != PASSWORD_FIELD)
        .collect();
    fields.push((EMAIL_FIELD.to_string(), email.to_string()));
    fields.push((PASSWORD_FIELD.to_string(), password.to_string()));

    Ok((action, fields))
}

fn inputs<'a>(form: ElementRef<'a>) -> impl Iterator<Item = (String, String)> + 'a {
    form.descendants()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "input")
        .filter(|e| {
            !matches!(
                e.value().attr("type"),
                Some("submit") | Some("button") | Some("checkbox")
            )
        })
        .filter_map(|e| {
            let name = e.value().attr("name")?;
            let value = e.value().attr("value").unwrap_or("");
            Some((name.to_string(), value.to_string()))
        })
}
