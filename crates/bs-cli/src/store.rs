use std::path::Path;

use bs_rules::StoreDocument;

pub fn load_store(path: &Path) -> Result<StoreDocument, String> {
    StoreDocument::load(path).map_err(|e| format!("Failed to read store '{}': {}", path.display(), e))
}

pub fn save_store(path: &Path, document: &StoreDocument) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create '{}': {}", parent.display(), e))?;
    }
    document
        .save(path)
        .map_err(|e| format!("Failed to write store '{}': {}", path.display(), e))
}
