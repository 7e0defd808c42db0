// genpdf needs real font files for glyph metrics.
use std::path::{Path, PathBuf};

use genpdf::fonts::{FontData, FontFamily};

use super::ConvertError;

const SYSTEM_FONT_DIRS: &[&str] = &[
    "/usr/share/fonts/truetype/liberation",
    "/usr/share/fonts/liberation",
    "/usr/share/fonts/liberation-serif",
    "/usr/share/fonts/truetype/dejavu",
    "/usr/share/fonts/dejavu",
    "/usr/share/fonts/dejavu-serif-fonts",
    "/usr/share/fonts/dejavu-sans-fonts",
    "/usr/share/fonts/TTF",
    "/System/Library/Fonts/Supplemental",
    "/Library/Fonts",
];

/// File names of one family, in regular, bold, italic, bold-italic order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyFiles {
    pub name: String,
    pub styles: [String; 4],
}

impl FamilyFiles {
    fn known(name: &str, regular: &str, bold: &str, italic: &str, bold_italic: &str) -> Self {
        Self {
            name: name.to_string(),
            styles: [regular, bold, italic, bold_italic].map(str::to_string),
        }
    }

    /// Layout of `name`: a known family's real file names, otherwise
    /// `<name>-Regular.ttf` and friends.
    pub fn for_family(name: &str) -> Self {
        match name {
            "DejaVuSerif" => Self::known(
                name,
                "DejaVuSerif.ttf",
                "DejaVuSerif-Bold.ttf",
                "DejaVuSerif-Italic.ttf",
                "DejaVuSerif-BoldItalic.ttf",
            ),
            "DejaVuSans" => Self::known(
                name,
                "DejaVuSans.ttf",
                "DejaVuSans-Bold.ttf",
                "DejaVuSans-Oblique.ttf",
                "DejaVuSans-BoldOblique.ttf",
            ),
            _ => Self {
                name: name.to_string(),
                styles: ["Regular", "Bold", "Italic", "BoldItalic"]
                    .map(|style| format!("{}-{}.ttf", name, style)),
            },
        }
    }

    fn load(&self, dir: &Path) -> Option<FontFamily<FontData>> {
        let [regular, bold, italic, bold_italic] = &self.styles;
        let load = |file: &String| FontData::load(dir.join(file), None).ok();
        Some(FontFamily {
            regular: load(regular)?,
            bold: load(bold)?,
            italic: load(italic)?,
            bold_italic: load(bold_italic)?,
        })
    }
}

const FALLBACK_FAMILIES: &[&str] = &["LiberationSerif", "DejaVuSerif", "LiberationSans", "DejaVuSans"];

/// Loads `preferred` (or a known fallback family) from `font_dir`, or from the
/// system font folders when no directory is configured.
pub fn load_family(
    font_dir: Option<&Path>,
    preferred: &str,
) -> Result<FontFamily<FontData>, ConvertError> {
    let dirs: Vec<PathBuf> = match font_dir {
        Some(dir) => vec![dir.to_path_buf()],
        None => SYSTEM_FONT_DIRS.iter().map(PathBuf::from).collect(),
    };
    let families: Vec<FamilyFiles> = std::iter::once(preferred)
        .chain(FALLBACK_FAMILIES.iter().copied())
        .map(FamilyFiles::for_family)
        .collect();

    dirs.iter()
        .filter(|dir| dir.exists())
        .find_map(|dir| {
            families.iter().find_map(|family| {
                let loaded = family.load(dir)?;
                tracing::debug!(family = %family.name, dir = %dir.display(), "Loaded PDF fonts");
                Some(loaded)
            })
        })
        .ok_or_else(|| {
            ConvertError::MissingDependency(
                "fonts (install fonts-liberation or fonts-dejavu, or set FONT_DIR)".to_string(),
            )
        })
}

/// First system directory holding a complete known family.
#[cfg(test)]
pub fn find_system_family() -> Option<(PathBuf, FamilyFiles)> {
    SYSTEM_FONT_DIRS.iter().map(PathBuf::from).find_map(|dir| {
        FALLBACK_FAMILIES
            .iter()
            .map(|name| FamilyFiles::for_family(name))
            .find(|family| family.styles.iter().all(|file| dir.join(file).is_file()))
            .map(|family| (dir, family))
    })
}
