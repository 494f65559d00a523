pub mod calendar;
pub mod loader;
pub mod types;

pub use calendar::MonthCalendar;
pub use loader::{
    evaluation_to_dataframe, reconciled_to_dataframe, row_errors_to_dataframe, write_dataframe,
    LoaderError, PanelLoader,
};
pub use types::{PanelColumns, PanelDataset, PanelError, PanelKey, PanelRow, PanelSlice};
