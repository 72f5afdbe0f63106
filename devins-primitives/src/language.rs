//! File extension to code-fence language mapping.

use std::path::Path;

const LANGUAGES: &[(&str, &str)] = &[
    ("rs", "rust"),
    ("kt", "kotlin"),
    ("kts", "kotlin"),
    ("java", "java"),
    ("py", "python"),
    ("js", "javascript"),
    ("mjs", "javascript"),
    ("ts", "typescript"),
    ("tsx", "tsx"),
    ("jsx", "jsx"),
    ("go", "go"),
    ("c", "c"),
    ("h", "c"),
    ("cpp", "cpp"),
    ("cc", "cpp"),
    ("hpp", "cpp"),
    ("cs", "csharp"),
    ("swift", "swift"),
    ("rb", "ruby"),
    ("php", "php"),
    ("scala", "scala"),
    ("sh", "bash"),
    ("bash", "bash"),
    ("zsh", "bash"),
    ("sql", "sql"),
    ("md", "markdown"),
    ("json", "json"),
    ("toml", "toml"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("xml", "xml"),
    ("html", "html"),
    ("css", "css"),
    ("gradle", "groovy"),
    ("devin", "devin"),
];

/// Returns the fence language for a path, or an empty string when unknown.
#[must_use]
pub fn language_for_path(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return "";
    };
    let ext = ext.to_ascii_lowercase();
    LANGUAGES
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map_or("", |(_, language)| language)
}
