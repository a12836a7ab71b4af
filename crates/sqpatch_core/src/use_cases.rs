mod install_patches;

pub use install_patches::{InstallPatchesUseCase, InstallProgress, InstallStage};
