//! Page assembly: render an HTML template and inject the chunk tags.

use std::path::{Path, PathBuf};

use minijinja::{context, path_loader, Environment};
use pagepack_descriptor::{Mode, PageEntry};
use pagepack_pipeline::collapse_whitespace;

use crate::builder::BuildError;
use crate::output::ChunkManifest;

/// Renders page templates found under the context directory.
pub struct PageAssembler {
    env: Environment<'static>,
    context_dir: PathBuf,
    mode: Mode,
    public_path: String,
}

impl PageAssembler {
    pub fn new(context_dir: &Path, mode: Mode, public_path: &str) -> Self {
        let mut env = Environment::new();
        env.set_loader(path_loader(context_dir));

        Self {
            env,
            context_dir: context_dir.to_path_buf(),
            mode,
            public_path: public_path.to_string(),
        }
    }

    /// Render one page with the chunk tags in place.
    pub fn assemble(
        &self,
        page: &PageEntry,
        manifest: &ChunkManifest,
    ) -> Result<String, BuildError> {
        let template_path = self.context_dir.join(&page.template);
        if !template_path.is_file() {
            return Err(BuildError::MissingTemplate {
                page: page.filename.clone(),
                path: template_path.display().to_string(),
            });
        }

        let name = template_name(&page.template);
        let template_error = |e: minijinja::Error| BuildError::TemplateError {
            path: template_path.display().to_string(),
            message: e.to_string(),
        };

        let tmpl = self.env.get_template(&name).map_err(template_error)?;
        let rendered = tmpl
            .render(context! {
                page => page,
                mode => self.mode.as_str(),
                scripts => &manifest.scripts,
                styles => &manifest.styles,
                public_path => &self.public_path,
            })
            .map_err(template_error)?;

        let html = inject_tags(&rendered, manifest);

        if page.minify(self.mode) {
            Ok(collapse_whitespace(&html))
        } else {
            Ok(html)
        }
    }
}

/// Loader name of a template path: `/`-separated, relative to the context.
fn template_name(template: &Path) -> String {
    template
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Insert stylesheet links before `</head>` and scripts before `</body>`.
///
/// Without those closing tags, links go first and scripts last.
pub fn inject_tags(html: &str, manifest: &ChunkManifest) -> String {
    let links: String = manifest
        .styles
        .iter()
        .map(|href| format!("<link href=\"{}\" rel=\"stylesheet\">", href))
        .collect();
    let scripts: String = manifest
        .scripts
        .iter()
        .map(|src| format!("<script src=\"{}\"></script>", src))
        .collect();

    let mut out = html.to_string();

    if !links.is_empty() {
        match find_tag(&out, "</head>") {
            Some(pos) => out.insert_str(pos, &links),
            None => out.insert_str(0, &links),
        }
    }

    if !scripts.is_empty() {
        match rfind_tag(&out, "</body>") {
            Some(pos) => out.insert_str(pos, &scripts),
            None => out.push_str(&scripts),
        }
    }

    out
}

fn find_tag(html: &str, tag: &str) -> Option<usize> {
    html.to_ascii_lowercase().find(tag)
}

fn rfind_tag(html: &str, tag: &str) -> Option<usize> {
    html.to_ascii_lowercase().rfind(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn manifest() -> ChunkManifest {
        ChunkManifest {
            scripts: vec!["vendors~main.js".to_string(), "main.js".to_string()],
            styles: vec!["main.css".to_string()],
        }
    }

    #[test]
    fn injects_before_closing_tags() {
        let html = "<html><head><title>x</title></head><body><p>hi</p></body></html>";
        let out = inject_tags(html, &manifest());

        assert_eq!(
            out,
            "<html><head><title>x</title><link href=\"main.css\" rel=\"stylesheet\"></head><body><p>hi</p><script src=\"vendors~main.js\"></script><script src=\"main.js\"></script></body></html>"
        );
    }

    #[test]
    fn injects_into_fragments() {
        let out = inject_tags("<p>hi</p>", &manifest());
        assert!(out.starts_with("<link"));
        assert!(out.ends_with("<script src=\"main.js\"></script>"));
    }

    #[test]
    fn renders_with_partials_and_context() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("partials")).unwrap();
        fs::write(
            temp.path().join("partials/nav.html"),
            "<nav>{{ page.filename }}</nav>",
        )
        .unwrap();
        fs::write(
            temp.path().join("contacts.html"),
            "<html>\n<head>\n</head>\n<body>\n{% include \"partials/nav.html\" %}\n<p>{{ mode }}</p>\n</body>\n</html>\n",
        )
        .unwrap();

        let assembler = PageAssembler::new(temp.path(), Mode::Development, "");
        let out = assembler
            .assemble(&PageEntry::new("contacts.html"), &manifest())
            .unwrap();

        assert!(out.contains("<nav>contacts.html</nav>"));
        assert!(out.contains("<p>development</p>"));
        assert!(out.contains("\n<script src=\"vendors~main.js\"></script><script src=\"main.js\"></script></body>"));
    }

    #[test]
    fn collapses_whitespace_in_production() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("index.html"),
            "<html>\n  <head>\n  </head>\n  <body>\n    <p>hi</p>\n  </body>\n</html>\n",
        )
        .unwrap();

        let page = PageEntry::new("index.html");
        let dev = PageAssembler::new(temp.path(), Mode::Development, "")
            .assemble(&page, &manifest())
            .unwrap();
        let prod = PageAssembler::new(temp.path(), Mode::Production, "")
            .assemble(&page, &manifest())
            .unwrap();

        assert!(prod.len() < dev.len());
        assert!(prod.contains("main.css"));
    }

    #[test]
    fn missing_template_is_fatal() {
        let temp = tempdir().unwrap();
        let err = PageAssembler::new(temp.path(), Mode::Production, "")
            .assemble(&PageEntry::new("services.html"), &manifest())
            .unwrap_err();

        assert!(matches!(err, BuildError::MissingTemplate { .. }));
        assert!(err.to_string().contains("services.html"));
    }

    #[test]
    fn missing_partial_is_fatal() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("index.html"),
            "{% include \"partials/missing.html\" %}",
        )
        .unwrap();

        let err = PageAssembler::new(temp.path(), Mode::Production, "")
            .assemble(&PageEntry::new("index.html"), &manifest())
            .unwrap_err();

        assert!(matches!(err, BuildError::TemplateError { .. }));
        assert!(err.to_string().contains("missing.html"));
    }
}
