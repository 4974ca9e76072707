//! Scaffold a new pagepack project.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Pages created by `init`, with their headings.
const PAGES: &[(&str, &str)] = &[
    ("index.html", "Home"),
    ("about-us.html", "About us"),
    ("contacts.html", "Contacts"),
    ("price-list.html", "Price list"),
    ("services.html", "Services"),
];

/// Run the init command.
pub async fn run(yes: bool) -> Result<()> {
    tracing::info!("Initializing pagepack...");
    scaffold(Path::new("."), yes)?;

    tracing::info!("Initialization complete!");
    tracing::info!("Run 'NODE_ENV=development pagepack dev' to start the development server.");

    Ok(())
}

fn scaffold(root: &Path, yes: bool) -> Result<()> {
    let src = root.join("src");

    if src.exists() && !yes {
        tracing::warn!("src/ directory already exists. Use --yes to overwrite.");
        return Ok(());
    }

    for dir in ["partials", "styles", "img"] {
        fs::create_dir_all(src.join(dir))
            .with_context(|| format!("Failed to create src/{}", dir))?;
    }

    write(root, "pagepack.toml", DEFAULT_CONFIG, yes)?;
    write(root, "src/index.js", DEFAULT_SCRIPT, yes)?;
    write(root, "src/styles/main.scss", DEFAULT_STYLES, yes)?;
    write(root, "src/partials/nav.html", &nav(), yes)?;
    write(root, "src/img/logo.svg", DEFAULT_LOGO, yes)?;

    for (filename, heading) in PAGES {
        let page = PAGE_TEMPLATE.replace("{heading}", heading);
        write(root, &format!("src/{}", filename), &page, yes)?;
    }

    Ok(())
}

fn write(root: &Path, relative: &str, contents: &str, yes: bool) -> Result<()> {
    let path = root.join(relative);
    if path.exists() && !yes {
        return Ok(());
    }
    fs::write(&path, contents).with_context(|| format!("Failed to write {}", relative))?;
    tracing::info!("Created {}", relative);
    Ok(())
}

fn nav() -> String {
    let links: String = PAGES
        .iter()
        .map(|(filename, heading)| {
            format!(
                "    <li><a href=\"{{{{ public_path }}}}{}\">{}</a></li>\n",
                filename, heading
            )
        })
        .collect();
    format!("<nav class=\"nav\">\n  <ul>\n{}  </ul>\n</nav>\n", links)
}

const DEFAULT_CONFIG: &str = r#"# pagepack configuration

[paths]
# Source directory; templates, scripts and styles live here
context = "src"

# Entry script, relative to the context
entry = "./index.js"

# Output directory, wiped on every build
output = "docs"

[output]
script_filename = "[name].js"
style_filename = "[name].css"

[dev_server]
port = 4200

[styles]
browserslist = ["defaults"]

[[copy]]
from = "img"
to = "img"
"#;

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{heading}</title>
  </head>
  <body>
    {% include "partials/nav.html" %}
    <main>
      <h1>{heading}</h1>
    </main>
  </body>
</html>
"#;

const DEFAULT_SCRIPT: &str = r#"import './styles/main.scss';

document.addEventListener('DOMContentLoaded', () => {
  const current = location.pathname.split('/').pop() || 'index.html';
  document.querySelectorAll('.nav a').forEach((link) => {
    if (link.getAttribute('href').endsWith(current)) {
      link.classList.add('active');
    }
  });
});
"#;

const DEFAULT_STYLES: &str = r#"$brand: #2b6cb0;

body {
  margin: 0;
  font-family: system-ui, sans-serif;
}

.nav {
  display: flex;
  background: url(../img/logo.svg) no-repeat left center;
  padding-left: 48px;

  ul {
    display: flex;
    gap: 1rem;
    list-style: none;
  }

  a.active {
    color: $brand;
  }
}
"#;

const DEFAULT_LOGO: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="32" height="32"><rect width="32" height="32" fill="#2b6cb0"/></svg>
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn scaffolds_five_pages() {
        let temp = tempdir().unwrap();
        scaffold(temp.path(), false).unwrap();

        for (filename, heading) in PAGES {
            let html = fs::read_to_string(temp.path().join("src").join(filename)).unwrap();
            assert!(html.contains(&format!("<h1>{}</h1>", heading)));
            assert!(html.contains("{% include \"partials/nav.html\" %}"));
        }
        assert!(temp.path().join("pagepack.toml").is_file());
        assert!(temp.path().join("src/img/logo.svg").is_file());

        let nav = fs::read_to_string(temp.path().join("src/partials/nav.html")).unwrap();
        assert!(nav.contains("href=\"{{ public_path }}price-list.html\""));
    }

    #[test]
    fn keeps_existing_sources() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/index.html"), "mine").unwrap();

        scaffold(temp.path(), false).unwrap();
        assert_eq!(
            fs::read_to_string(temp.path().join("src/index.html")).unwrap(),
            "mine"
        );
        assert!(!temp.path().join("pagepack.toml").exists());
    }

    #[test]
    fn scaffolded_config_parses() {
        assert!(toml::from_str::<crate::config::ConfigFile>(DEFAULT_CONFIG).is_ok());
    }

    #[test]
    fn scaffolded_project_builds() {
        use pagepack_descriptor::{Descriptor, Mode};
        use pagepack_static::StaticBuilder;

        let temp = tempdir().unwrap();
        scaffold(temp.path(), false).unwrap();

        let build = StaticBuilder::new(Descriptor::new(temp.path(), Mode::Production))
            .build_in_memory()
            .unwrap();

        assert_eq!(build.pages, 5);
        assert!(build.output.contains("main.css"));
        assert!(build.output.contains("img/logo.svg"));
    }
}
