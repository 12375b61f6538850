//! Serving directory and the HTML file listing.

use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Line in the template replaced by one table row per file.
pub const FILELIST_MARKER: &str = "<!--filelist_label-->";

const BUNDLED_TEMPLATE: &str = include_str!("../html/filelist.html");

/// The flat directory files are served from, plus the listing template.
#[derive(Debug, Clone)]
pub struct ServeRoot {
    dir: PathBuf,
    template: PathBuf,
}

impl ServeRoot {
    pub fn new(dir: impl Into<PathBuf>, template: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            template: template.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of `name` inside the serving directory. `name` must be a flat name.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Regular files in the serving directory, sorted by name.
    pub fn file_names(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Renders the listing page for the directory as it is right now.
    pub fn render_listing(&self) -> String {
        let template = match std::fs::read_to_string(&self.template) {
            Ok(t) => t,
            Err(e) => {
                warn!(
                    path = %self.template.display(),
                    error = %e,
                    "listing template unreadable, using bundled copy"
                );
                BUNDLED_TEMPLATE.to_string()
            }
        };
        let names = self.file_names().unwrap_or_else(|e| {
            warn!(dir = %self.dir.display(), error = %e, "serving directory unreadable");
            Vec::new()
        });
        splice(&template, &names)
    }
}

/// Copies `template` line by line, replacing the marker line with file rows.
/// Without a marker the rows go at the end.
pub fn splice(template: &str, names: &[String]) -> String {
    let mut out = String::with_capacity(template.len() + names.len() * 160);
    let mut spliced = false;

    for line in template.lines() {
        if !spliced && line.trim() == FILELIST_MARKER {
            push_rows(&mut out, names);
            spliced = true;
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    if !spliced {
        push_rows(&mut out, names);
    }
    out
}

fn push_rows(out: &mut String, names: &[String]) {
    for name in names {
        let name = escape_html(name);
        out.push_str(&format!(
            "            <tr><td class=\"col1\">{name}</td> <td class=\"col2\"><a href=\"downl/{name}\">downl</a></td> <td class=\"col3\"><a href=\"#\" onclick=\"return confirmDelete('{name}');\">remov</a></td></tr>\n"
        ));
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
