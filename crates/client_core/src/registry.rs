//! Loaded images and their selection flags.

use shared::domain::{Image, ImageId};
use tracing::error;

use crate::error::RegistryError;

#[derive(Debug, Default, Clone)]
pub struct ImageRegistry {
    images: Vec<Image>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a freshly loaded image. Ids are assigned by the renderer, so a
    /// duplicate means the renderer broke its own contract.
    pub fn add(&mut self, image: Image) -> Result<(), RegistryError> {
        if self.position(&image.id).is_some() {
            error!(image_id = %image.id, "renderer reused an image id");
            return Err(RegistryError::DuplicateId(image.id));
        }
        self.images.push(image);
        Ok(())
    }

    /// Flips the selection flag and returns the new value.
    pub fn toggle_selection(&mut self, id: &ImageId) -> Result<bool, RegistryError> {
        let image = self
            .images
            .iter_mut()
            .find(|image| &image.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        image.selected = !image.selected;
        Ok(image.selected)
    }

    pub fn list_selected(&self) -> Vec<Image> {
        self.images
            .iter()
            .filter(|image| image.selected)
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &ImageId) -> Option<&Image> {
        self.images.iter().find(|image| &image.id == id)
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    fn position(&self, id: &ImageId) -> Option<usize> {
        self.images.iter().position(|image| &image.id == id)
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
