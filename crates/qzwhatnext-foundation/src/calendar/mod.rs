//! External calendar integration.
//!
//! [`gateway::CalendarGateway`] is the seam the runtime reconciler talks
//! to; [`google::GoogleCalendarClient`] implements it over the Google
//! Calendar v3 REST API, and [`oauth`] handles the token lifecycle.

pub mod gateway;
pub mod google;
pub mod oauth;

pub use gateway::{
    CalendarError, CalendarEvent, CalendarGateway, CalendarResult, EventDraft, EventPatch,
    SharedCalendarGateway, PRIVATE_KEY_BLOCK_ID, PRIVATE_KEY_MANAGED, PRIVATE_KEY_TASK_ID,
    PRIVATE_KEY_TIME_BLOCK_ID,
};
pub use google::GoogleCalendarClient;
pub use oauth::{GoogleOAuth, OAuthTokens};
