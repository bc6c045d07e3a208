//! Domain models shared by the VSS crates

pub mod category;
pub mod run;
pub mod user;
pub mod variant;

pub use category::{categorize, Category};
pub use run::{IngestionRun, SiteStats};
pub use user::{NotificationPreferences, UserDocument};
pub use variant::{
    category_of, selected_for_removal, Classification, ClassificationRecord, Coordinates,
    VariantDocument, VariantKey, MAX_STAR_RATING, VARIANT_KEY_DELIMITER,
};
