//! `$name` property templating
//!
//! `$name` and `${name}` are replaced with the property's value, `$$`
//! becomes `$`, and placeholders naming unknown properties are left as they
//! are.

use super::Properties;
use crate::Result;
use regex::{Captures, Regex};
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:(\$)|([_a-zA-Z][_a-zA-Z0-9]*)|\{([_a-zA-Z][_a-zA-Z0-9]*)\})")
        .expect("placeholder pattern is valid")
});

/// Substitute properties into `text`
pub fn substitute(text: &str, properties: &Properties) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| {
            if caps.get(1).is_some() {
                return "$".to_string();
            }
            let name = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
            match properties.get(name) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Substitute properties into a file in place
pub async fn fill_file(path: &Path, properties: &Properties) -> Result<()> {
    debug!("Templating {:?}", path);
    let contents = async_fs::read_to_string(path).await?;
    async_fs::write(path, substitute(&contents, properties)).await?;
    Ok(())
}
