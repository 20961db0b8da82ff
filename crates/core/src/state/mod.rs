pub mod catalog;
pub mod db;
pub mod exclusions;
pub mod extracted;
pub mod paging;
pub mod patterns;
pub mod requests;

pub use db::RefileDb;

pub use catalog::{CatalogFilter, CatalogManager, IndexedFile, NewFile};
pub use exclusions::{ExclusionManager, ExclusionPattern, ExclusionUpdate};
pub use extracted::{ExtractedData, ExtractedDataManager};
pub use paging::{ListQuery, Page, SortOrder};
pub use patterns::{FileChangePattern, PatternManager, PatternStage, TestRecord};
pub use requests::{
    ChangeTarget, FileChangeRequest, FileChangeRequestDetail, NewChangeTarget, RequestManager,
    RequestStatus, TargetStatus,
};
