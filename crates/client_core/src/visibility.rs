//! Keeps renderer opacity in line with the active image and maps view modes
//! to slice-type codes.

use renderer_integration::RendererAdapter;
use shared::{
    domain::Image,
    protocol::{SliceTypeCode, ViewMode},
};
use tracing::{debug, warn};

use crate::error::VisibilityError;

const VISIBLE: f32 = 1.0;
const HIDDEN: f32 = 0.0;

pub fn slice_type_for(mode: ViewMode) -> SliceTypeCode {
    match mode {
        ViewMode::Axial => SliceTypeCode::AXIAL,
        ViewMode::Coronal => SliceTypeCode::CORONAL,
        ViewMode::Sagittal => SliceTypeCode::SAGITTAL,
        ViewMode::Multi => SliceTypeCode::MULTIPLANAR,
        ViewMode::Render => SliceTypeCode::RENDER,
    }
}

/// Same as [`slice_type_for`] for a mode given by name; unknown names map to
/// the axial code.
pub fn slice_type_for_name(raw: &str) -> SliceTypeCode {
    slice_type_for(ViewMode::parse_or_default(raw))
}

#[derive(Debug, Default)]
pub struct VisibilityController {
    active: Option<usize>,
    view_mode: ViewMode,
}

impl VisibilityController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<usize> {
        self.active
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    /// Shows the image at `index` and hides every other one, then redraws
    /// once. Calling it again with the same index repeats the assignment.
    pub fn set_active(
        &mut self,
        renderer: &mut dyn RendererAdapter,
        images: &[Image],
        index: usize,
    ) -> Result<(), VisibilityError> {
        if index >= images.len() {
            return Err(VisibilityError::IndexOutOfRange {
                index,
                len: images.len(),
            });
        }
        self.active = Some(index);

        for (position, image) in images.iter().enumerate() {
            let Some(volume_index) = renderer.volume_index_by_id(&image.id) else {
                warn!(image_id = %image.id, "image has no volume in the renderer; skipping");
                continue;
            };
            let opacity = if position == index { VISIBLE } else { HIDDEN };
            if let Err(err) = renderer.set_opacity(volume_index, opacity) {
                warn!(image_id = %image.id, error = %err, "failed to set volume opacity");
            }
        }
        renderer.update_gl_volume();
        debug!(index, image_id = %images[index].id, "active volume changed");
        Ok(())
    }

    pub fn set_view_mode(
        &mut self,
        renderer: &mut dyn RendererAdapter,
        mode: ViewMode,
    ) -> SliceTypeCode {
        let code = slice_type_for(mode);
        self.view_mode = mode;
        renderer.set_slice_type(code);
        debug!(%mode, code = code.0, "view mode changed");
        code
    }
}
