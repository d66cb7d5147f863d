//! Step gating for the three-step submission wizard.
//!
//! Every decision here is a pure function of the authentication state and the most recently
//! fetched [`ApplicationStatus`]. Navigation itself is performed by the router, which turns a
//! redirect decision into a full `303 See Other` so the destination re-fetches status.

use serde::{Deserialize, Serialize};

use super::domain::{ApplicationStatus, Identity};
use super::session::AuthState;

/// Wizard steps in the order an applicant completes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Details,
    Upload,
    Confirmation,
}

impl Step {
    pub const ALL: [Step; 3] = [Step::Details, Step::Upload, Step::Confirmation];

    pub const fn route(self) -> Route {
        Route::Step(self)
    }

    pub const fn number(self) -> u8 {
        match self {
            Step::Details => 1,
            Step::Upload => 2,
            Step::Confirmation => 3,
        }
    }

    pub const fn title(self) -> &'static str {
        match self {
            Step::Details => "Personal Information",
            Step::Upload => "Required Documentation",
            Step::Confirmation => "Confirmation",
        }
    }

    pub fn caption(self) -> String {
        format!(
            "Step {} of {} - {}",
            self.number(),
            Step::ALL.len(),
            self.title()
        )
    }

    pub fn prerequisites_met(self, status: &ApplicationStatus) -> bool {
        match self {
            Step::Details => true,
            Step::Upload => status.has_details(),
            Step::Confirmation => status.has_details() && status.has_documents(),
        }
    }
}

/// Furthest step the applicant may currently open.
pub fn next_step(status: &ApplicationStatus) -> Step {
    Step::ALL
        .into_iter()
        .rev()
        .find(|step| step.prerequisites_met(status))
        .unwrap_or(Step::Details)
}

/// Client-visible navigation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Entry,
    Step(Step),
}

impl Route {
    pub const fn path(self) -> &'static str {
        match self {
            Route::Entry => "/",
            Route::Step(Step::Details) => "/details",
            Route::Step(Step::Upload) => "/upload",
            Route::Step(Step::Confirmation) => "/confirmation",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        let trimmed = path.trim();
        let normalized = match trimmed.trim_end_matches('/') {
            "" => "/",
            other => other,
        };
        match normalized {
            "/" => Some(Route::Entry),
            "/details" => Some(Route::Step(Step::Details)),
            "/upload" => Some(Route::Step(Step::Upload)),
            "/confirmation" => Some(Route::Step(Step::Confirmation)),
            _ => None,
        }
    }
}

/// Result of the status query as seen by the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusState {
    Loading,
    Ready(ApplicationStatus),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Status still loading; show a neutral indicator and do not redirect.
    Wait,
    Render(Step),
    Redirect(Route),
    /// Status could not be fetched; render an error view instead of guessing.
    Unavailable(String),
}

/// Decides whether `required` may be rendered for the given status.
pub fn decide_route(required: Step, status: &StatusState) -> GuardDecision {
    let status = match status {
        StatusState::Loading => return GuardDecision::Wait,
        StatusState::Failed(message) => return GuardDecision::Unavailable(message.clone()),
        StatusState::Ready(status) => status,
    };

    let has_details = status.has_details();
    let has_documents = status.has_documents();

    match required {
        Step::Upload if !has_details => GuardDecision::Redirect(Step::Details.route()),
        Step::Confirmation if !has_details => GuardDecision::Redirect(Step::Details.route()),
        Step::Confirmation if !has_documents => GuardDecision::Redirect(Step::Upload.route()),
        step => GuardDecision::Render(step),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision<'a> {
    Wait,
    RedirectToEntry,
    Proceed(&'a Identity),
}

/// Gate wrapping every step route.
pub fn decide_auth(state: &AuthState) -> AuthDecision<'_> {
    match state {
        AuthState::Initializing => AuthDecision::Wait,
        AuthState::Anonymous => AuthDecision::RedirectToEntry,
        AuthState::Authenticated(identity) => AuthDecision::Proceed(identity),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryDecision {
    Wait,
    ShowLogin,
    Redirect(Route),
}

/// The entry route shows the login view to anonymous callers and sends everyone else onward.
pub fn decide_entry(state: &AuthState) -> EntryDecision {
    match state {
        AuthState::Initializing => EntryDecision::Wait,
        AuthState::Anonymous => EntryDecision::ShowLogin,
        AuthState::Authenticated(_) => EntryDecision::Redirect(Step::Details.route()),
    }
}

/// Outcome of a full navigation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Wait,
    ShowLogin,
    Render(Step),
    Redirect(Route),
    Unavailable(String),
}

/// Composes the entry rule, authentication gate, and step guard for one navigation.
///
/// `status` is only consulted for step routes with an authenticated session.
pub fn navigate(route: Route, auth: &AuthState, status: &StatusState) -> Navigation {
    let step = match route {
        Route::Entry => {
            return match decide_entry(auth) {
                EntryDecision::Wait => Navigation::Wait,
                EntryDecision::ShowLogin => Navigation::ShowLogin,
                EntryDecision::Redirect(target) => Navigation::Redirect(target),
            }
        }
        Route::Step(step) => step,
    };

    match decide_auth(auth) {
        AuthDecision::Wait => Navigation::Wait,
        AuthDecision::RedirectToEntry => Navigation::Redirect(Route::Entry),
        AuthDecision::Proceed(_) => match decide_route(step, status) {
            GuardDecision::Wait => Navigation::Wait,
            GuardDecision::Render(step) => Navigation::Render(step),
            GuardDecision::Redirect(target) => Navigation::Redirect(target),
            GuardDecision::Unavailable(message) => Navigation::Unavailable(message),
        },
    }
}
