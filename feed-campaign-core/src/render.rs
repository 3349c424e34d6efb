//! Campaign body rendering.
//!
//! Templates use a small Jinja-style subset, enough for a newsletter body:
//!
//! ```text
//! # {{ count }} new posts
//! {% for item in items %}
//! ## [{{ item.title }}]({{ item.link }})
//! {% if item.image %}![]({{ item.image }}){% endif %}
//! {{ item.summary }}
//! {% endfor %}
//! ```
//!
//! Item fields: `id`, `title`, `link`, `summary`, `published` (`YYYY-MM-DD`),
//! `image` (alias `media_content`) and `og.<key>` for any Open Graph attribute.
//! A missing optional value renders as an empty string; an unknown field is an error.

use std::path::Path;

use regex::{Captures, Regex};

use crate::contract::FeedItem;
use crate::error::{Error, Result};

const LOOP_PATTERN: &str =
    r"(?s)\{%-?\s*for\s+(\w+)\s+in\s+items\s*-?%\}(.*?)\{%-?\s*endfor\s*-?%\}";
const IF_PATTERN: &str =
    r"(?s)\{%-?\s*if\s+(\w+)\.([\w.]+)\s*-?%\}(.*?)\{%-?\s*endif\s*-?%\}";
const VAR_PATTERN: &str = r"\{\{\s*(\w+)(?:\.([\w.]+))?\s*\}\}";

pub struct Template {
    source: String,
    loop_re: Regex,
    if_re: Regex,
    var_re: Regex,
}

impl Template {
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| Error::Template(format!("bad pattern: {e}")))
        };
        Ok(Self {
            source: source.into(),
            loop_re: compile(LOOP_PATTERN)?,
            if_re: compile(IF_PATTERN)?,
            var_re: compile(VAR_PATTERN)?,
        })
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::configuration(format!("cannot read template {}: {e}", path.display()))
        })?;
        Self::new(source)
    }

    /// Renders the items in the order given.
    pub fn render(&self, items: &[FeedItem]) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        let mut last = 0;
        for caps in self.loop_re.captures_iter(&self.source) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            out.push_str(&self.render_outer(&self.source[last..whole.start], items)?);
            let var = &caps[1];
            let body = &caps[2];
            for item in items {
                out.push_str(&self.render_item(body, var, item)?);
            }
            last = whole.end;
        }
        out.push_str(&self.render_outer(&self.source[last..], items)?);
        Ok(out)
    }

    fn render_outer(&self, text: &str, items: &[FeedItem]) -> Result<String> {
        let mut error = None;
        let rendered = self.var_re.replace_all(text, |caps: &Captures| {
            match (&caps[1], caps.get(2)) {
                ("count", None) => items.len().to_string(),
                _ => {
                    error.get_or_insert_with(|| {
                        Error::Template(format!("unknown variable `{}` outside loop", &caps[0]))
                    });
                    String::new()
                }
            }
        });
        if let Some(e) = error {
            return Err(e);
        }
        if rendered.contains("{%") {
            return Err(Error::Template("unsupported block tag outside loop".into()));
        }
        Ok(rendered.into_owned())
    }

    fn render_item(&self, body: &str, var: &str, item: &FeedItem) -> Result<String> {
        let mut error = None;
        let body = self.if_re.replace_all(body, |caps: &Captures| {
            if &caps[1] != var {
                error.get_or_insert_with(|| Error::Template(format!("unknown variable `{}`", &caps[1])));
                return String::new();
            }
            match field(item, &caps[2]) {
                Ok(value) if !value.is_empty() => caps[3].to_string(),
                Ok(_) => String::new(),
                Err(e) => {
                    error.get_or_insert(e);
                    String::new()
                }
            }
        });
        let rendered = self.var_re.replace_all(&body, |caps: &Captures| {
            let path = caps.get(2).map(|m| m.as_str());
            match (&caps[1] == var, path) {
                (true, Some(path)) => field(item, path).unwrap_or_else(|e| {
                    error.get_or_insert(e);
                    String::new()
                }),
                _ => {
                    error.get_or_insert_with(|| {
                        Error::Template(format!("unknown variable `{}`", &caps[0]))
                    });
                    String::new()
                }
            }
        });
        match error {
            Some(e) => Err(e),
            None => Ok(rendered.into_owned()),
        }
    }
}

fn field(item: &FeedItem, path: &str) -> Result<String> {
    let value = match path {
        "id" => item.id.clone(),
        "title" => item.title.clone(),
        "link" => item.link.clone(),
        "summary" => item.summary.clone(),
        "published" => item.published.format("%Y-%m-%d").to_string(),
        "image" | "media_content" => item.image.clone().unwrap_or_default(),
        other => match other
            .strip_prefix("og.")
            .or_else(|| other.strip_prefix("open_graph."))
        {
            Some(key) => item.open_graph.get(key).cloned().unwrap_or_default(),
            None => return Err(Error::Template(format!("unknown item field `{other}`"))),
        },
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::PageMetadata;
    use chrono::{TimeZone, Utc};

    fn item(slug: &str, image: Option<&str>) -> FeedItem {
        let mut open_graph = PageMetadata::new();
        open_graph.insert("site_name".into(), "Example Blog".into());
        FeedItem {
            id: slug.into(),
            link: format!("https://blog.example.com/{slug}"),
            title: format!("Post {slug}"),
            summary: format!("Summary of {slug}"),
            published: Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap(),
            image: image.map(str::to_string),
            open_graph,
        }
    }

    const TEMPLATE: &str = "# {{ count }} new\n{% for item in items %}\
- [{{ item.title }}]({{ item.link }}) {{ item.published }}\
{% if item.image %} ![]({{ item.image }}){% endif %}\n{% endfor %}Bye";

    #[test]
    fn renders_items_in_given_order() {
        let template = Template::new(TEMPLATE).unwrap();
        let body = template
            .render(&[item("b", None), item("a", Some("https://img/a.png"))])
            .unwrap();

        assert_eq!(
            body,
            "# 2 new\n\
- [Post b](https://blog.example.com/b) 2024-04-01\n\
- [Post a](https://blog.example.com/a) 2024-04-01 ![](https://img/a.png)\n\
Bye"
        );
    }

    #[test]
    fn open_graph_and_legacy_image_alias_are_available() {
        let template =
            Template::new("{% for it in items %}{{ it.og.site_name }}|{{ it.media_content }}|{{ it.og.missing }}{% endfor %}")
                .unwrap();

        let body = template.render(&[item("x", Some("img.png"))]).unwrap();

        assert_eq!(body, "Example Blog|img.png|");
    }

    #[test]
    fn unknown_field_is_a_template_error() {
        let template = Template::new("{% for item in items %}{{ item.author }}{% endfor %}").unwrap();
        assert!(matches!(
            template.render(&[item("x", None)]),
            Err(Error::Template(_))
        ));
    }

    #[test]
    fn unknown_outer_variable_is_a_template_error() {
        let template = Template::new("{{ items }}").unwrap();
        assert!(matches!(template.render(&[]), Err(Error::Template(_))));
    }

    #[tokio::test]
    async fn bundled_template_renders_every_item() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../template.md.j2");
        let template = Template::load(path).await.unwrap();

        let body = template
            .render(&[item("a", Some("https://img/a.png")), item("b", None)])
            .unwrap();

        assert!(body.starts_with("# 2 new post(s)"));
        assert!(body.contains("## [Post a](https://blog.example.com/a)"));
        assert!(body.contains("![Post a](https://img/a.png)"));
        assert!(body.contains("Summary of b"));
        assert!(!body.contains("{{"));
    }

    #[tokio::test]
    async fn missing_template_file_is_a_configuration_error() {
        let err = Template::load("/nonexistent/template.md.j2").await.err();
        assert!(matches!(err, Some(Error::Configuration(_))));
    }
}
