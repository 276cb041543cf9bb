//! DOM compatibility surface of the task manager UI
//!
//! Every selector the smoke run depends on lives here so a markup change in
//! the application shows up as a one-line diff.

use serde::{Deserialize, Serialize};

use crate::driver::Locator;

pub const THEME_ATTRIBUTE: &str = "data-theme";

pub fn login_form() -> Locator {
    Locator::css("form.login-form")
}

pub fn username_field() -> Locator {
    Locator::css("#username")
}

pub fn password_field() -> Locator {
    Locator::css("#password")
}

pub fn login_submit() -> Locator {
    Locator::css(r#"form.login-form button[type="submit"]"#)
}

pub fn sign_out_button() -> Locator {
    Locator::button("Sign out")
}

// Task board

pub fn task_card(title: &str) -> Locator {
    Locator::with_text(".task-card", title)
}

pub fn new_task_button() -> Locator {
    Locator::button("New task")
}

pub fn task_title_field() -> Locator {
    Locator::css("#task-title")
}

pub fn task_description_field() -> Locator {
    Locator::css("#task-description")
}

pub fn task_status_field() -> Locator {
    Locator::css("#task-status")
}

pub fn task_priority_field() -> Locator {
    Locator::css("#task-priority")
}

pub fn tag_input() -> Locator {
    Locator::css(r#"input[placeholder="Create or attach tag (press Enter)"]"#)
}

/// Chips render the tag with a leading `#`
pub fn tag_chip(tag: &str) -> Locator {
    Locator::with_text(".tag-chip", format!("#{tag}"))
}

pub fn create_task_button() -> Locator {
    Locator::button("Create task")
}

pub fn save_changes_button() -> Locator {
    Locator::button("Save changes")
}

pub fn delete_task_button() -> Locator {
    Locator::button("Delete task")
}

pub fn saved_indicator() -> Locator {
    Locator::with_text(".pill", "Saved")
}

// Theme

pub fn theme_root() -> Locator {
    Locator::css("html")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Default,
    Dark,
}

impl Theme {
    pub fn from_attribute(value: Option<&str>) -> Self {
        match value {
            Some("dark") => Theme::Dark,
            _ => Theme::Default,
        }
    }

    pub fn attribute_value(self) -> &'static str {
        match self {
            Theme::Default => "default",
            Theme::Dark => "dark",
        }
    }

    pub fn alternate(self) -> Self {
        match self {
            Theme::Default => Theme::Dark,
            Theme::Dark => Theme::Default,
        }
    }

    /// Toolbar button that selects this theme
    pub fn button(self) -> Locator {
        match self {
            Theme::Default => Locator::button("Light"),
            Theme::Dark => Locator::button("Dark"),
        }
    }
}

// App switcher

pub fn switcher_desktop_trigger() -> Locator {
    Locator::css(".app-switcher-trigger")
}

pub fn switcher_mobile_trigger() -> Locator {
    Locator::css(".app-switcher-mobile-trigger")
}

/// The menu container; rendered while the switcher is open, items may follow later
pub fn switcher_menu() -> Locator {
    Locator::css(".app-switcher-menu")
}

pub const EXPANDED_ATTRIBUTE: &str = "aria-expanded";

pub fn switcher_menu_item(label: &str) -> Locator {
    Locator::with_text(r#".app-switcher-menu [role="menuitem"]"#, label)
}

// Land

pub fn land_summary_cards() -> Locator {
    Locator::css(".land-summary .summary-card")
}

/// The two listing panels of the land view, each with its row locator
pub fn land_listing_rows() -> [(&'static str, Locator); 2] {
    [
        ("parcels", Locator::css(".land-parcels-panel .list-row")),
        ("owners", Locator::css(".land-owners-panel .list-row")),
    ]
}

pub fn land_detail_rows() -> Locator {
    Locator::css(".land-detail-panel .detail-row")
}

/// A navigable top-level view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationTarget {
    Tasks,
    Land,
}

impl NavigationTarget {
    pub const ALL: [NavigationTarget; 2] = [NavigationTarget::Tasks, NavigationTarget::Land];

    /// Identifier used by persisted client state and the internal event bus
    pub fn key(self) -> &'static str {
        match self {
            NavigationTarget::Tasks => "tasks",
            NavigationTarget::Land => "land",
        }
    }

    /// Label of the app switcher menu item
    pub fn label(self) -> &'static str {
        match self {
            NavigationTarget::Tasks => "Tasks",
            NavigationTarget::Land => "Land",
        }
    }

    /// Root layout whose visibility means navigation succeeded
    pub fn layout(self) -> Locator {
        match self {
            NavigationTarget::Tasks => Locator::css(".tasks-layout"),
            NavigationTarget::Land => Locator::css(".land-layout"),
        }
    }

    pub fn menu_item(self) -> Locator {
        switcher_menu_item(self.label())
    }
}

impl std::fmt::Display for NavigationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}
