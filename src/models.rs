use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Separator between goal and subtask ids in a completion key
pub const KEY_SEPARATOR: &str = "::";

/// Build the composite completion key `"<goalId>::<subtaskId>"`
pub fn completion_key(goal_id: &str, subtask_id: &str) -> String {
    format!("{}{}{}", goal_id, KEY_SEPARATOR, subtask_id)
}

/// Generate a fresh identifier, e.g. `g_3fa9c1d2e4b5_18c2f0a1b2c`
pub fn uid(prefix: &str) -> String {
    let random: u64 = rand::thread_rng().r#gen();
    let millis = chrono::Utc::now().timestamp_millis();
    format!("{}_{:x}_{:x}", prefix, random, millis)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Dark,
    Light,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weight {
    #[default]
    Normal,
    Hard,
}

impl Weight {
    /// Experience awarded for one completed check of this weight
    pub fn xp(self) -> u64 {
        match self {
            Weight::Normal => 10,
            Weight::Hard => 20,
        }
    }
}

/// Goal category. The serialized names are the ones stored in existing documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Маркетинг")]
    Marketing,
    #[serde(rename = "Продажи")]
    Sales,
    #[serde(rename = "Продукт")]
    Product,
    #[serde(rename = "Работа")]
    Work,
    #[serde(rename = "Здоровье")]
    Health,
    #[serde(rename = "Спорт")]
    Sport,
    #[serde(rename = "Личное")]
    Personal,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Marketing,
        Category::Sales,
        Category::Product,
        Category::Work,
        Category::Health,
        Category::Sport,
        Category::Personal,
    ];

    /// Name as stored in the document
    pub fn wire_name(self) -> &'static str {
        match self {
            Category::Marketing => "Маркетинг",
            Category::Sales => "Продажи",
            Category::Product => "Продукт",
            Category::Work => "Работа",
            Category::Health => "Здоровье",
            Category::Sport => "Спорт",
            Category::Personal => "Личное",
        }
    }

    /// Accepts either the stored name or the English label (case-insensitive)
    pub fn parse(s: &str) -> Option<Category> {
        let s = s.trim();
        Category::ALL.into_iter().find(|c| {
            c.wire_name() == s || c.to_string().eq_ignore_ascii_case(s)
        })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Category::Marketing => "Marketing",
            Category::Sales => "Sales",
            Category::Product => "Product",
            Category::Work => "Work",
            Category::Health => "Health",
            Category::Sport => "Sport",
            Category::Personal => "Personal",
        };
        f.write_str(label)
    }
}

/// Goal list filter shown on the admin screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

const FILTER_ALL: &str = "Все";

impl TryFrom<String> for CategoryFilter {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == FILTER_ALL || value.eq_ignore_ascii_case("all") {
            return Ok(CategoryFilter::All);
        }
        Category::parse(&value)
            .map(CategoryFilter::Only)
            .ok_or_else(|| format!("unknown category filter: {}", value))
    }
}

impl From<CategoryFilter> for String {
    fn from(filter: CategoryFilter) -> Self {
        match filter {
            CategoryFilter::All => FILTER_ALL.to_string(),
            CategoryFilter::Only(c) => c.wire_name().to_string(),
        }
    }
}

impl CategoryFilter {
    pub fn matches(self, category: Category) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(c) => c == category,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub weight: Weight,
}

impl Subtask {
    pub fn new(text: impl Into<String>, weight: Weight) -> Self {
        Self {
            id: uid("t"),
            text: text.into(),
            weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub title: String,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_time: Option<String>, // HH:MM
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
}

impl Goal {
    pub fn new(title: impl Into<String>, category: Category) -> Self {
        Self {
            id: uid("g"),
            title: title.into(),
            category,
            reminder_time: None,
            subtasks: Vec::new(),
        }
    }

    /// Completion keys of every subtask, in display order
    pub fn completion_keys(&self) -> impl Iterator<Item = String> + '_ {
        self.subtasks.iter().map(|t| completion_key(&self.id, &t.id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyEntry {
    #[serde(rename = "dateISO")]
    pub date: String, // YYYY-MM-DD
    #[serde(default)]
    pub checks: BTreeMap<String, bool>,
    #[serde(default)]
    pub notes: String,
}

impl DailyEntry {
    pub fn new(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            checks: BTreeMap::new(),
            notes: String::new(),
        }
    }

    pub fn is_checked(&self, key: &str) -> bool {
        self.checks.get(key).copied().unwrap_or(false)
    }

    /// True when at least one check on this day is set
    pub fn has_any_check(&self) -> bool {
        self.checks.values().any(|&v| v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetKind {
    Heatmap,
    Chart,
    Streak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Bar,
}

impl ChartType {
    pub fn toggled(self) -> Self {
        match self {
            ChartType::Line => ChartType::Bar,
            ChartType::Bar => ChartType::Line,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    pub id: String,
    pub kind: WidgetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<ChartType>,
}

impl Widget {
    /// New widget; charts start as line charts
    pub fn new(kind: WidgetKind) -> Self {
        Self {
            id: uid("w"),
            kind,
            chart_type: (kind == WidgetKind::Chart).then_some(ChartType::Line),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub enabled: bool,
    pub quiet_hours_enabled: bool,
    pub quiet_from: String,
    pub quiet_to: String,
    pub morning_brief_enabled: bool,
    pub morning_time: String,
    pub evening_report_enabled: bool,
    pub evening_time: String,
    pub goal_reminders_enabled: bool,
    /// Keyed by goal id; key set mirrors the current goals
    #[serde(default)]
    pub per_goal_enabled: BTreeMap<String, bool>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            quiet_hours_enabled: true,
            quiet_from: "22:00".to_string(),
            quiet_to: "07:00".to_string(),
            morning_brief_enabled: true,
            morning_time: "08:00".to_string(),
            evening_report_enabled: true,
            evening_time: "21:00".to_string(),
            goal_reminders_enabled: true,
            per_goal_enabled: BTreeMap::new(),
        }
    }
}

/// The whole per-user document. Persisted and replicated as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(default)]
    pub theme: ThemeMode,
    #[serde(default)]
    pub goals: Vec<Goal>,
    /// Sorted ascending by date, one entry per date
    #[serde(default)]
    pub entries: Vec<DailyEntry>,
    #[serde(default)]
    pub widgets: Vec<Widget>,
    #[serde(default)]
    pub notification: NotificationSettings,
    #[serde(default)]
    pub admin_category_filter: CategoryFilter,
}

impl AppState {
    /// First-run document: two sample goals, default notifications, three widgets
    pub fn seeded() -> Self {
        let mut brand = Goal::new("Q3 brand launch", Category::Marketing);
        brand.reminder_time = Some("10:00".to_string());
        brand.subtasks = vec![
            Subtask::new("Design sign-off", Weight::Hard),
            Subtask::new("Ad campaign setup", Weight::Normal),
        ];

        let mut clients = Goal::new("10 new clients", Category::Sales);
        clients.reminder_time = Some("15:00".to_string());
        clients.subtasks = vec![Subtask::new("1 call", Weight::Hard)];

        let goals = vec![brand, clients];

        let mut notification = NotificationSettings::default();
        notification.per_goal_enabled = goals.iter().map(|g| (g.id.clone(), true)).collect();

        Self {
            theme: ThemeMode::Dark,
            goals,
            entries: Vec::new(),
            widgets: vec![
                Widget::new(WidgetKind::Heatmap),
                Widget::new(WidgetKind::Chart),
                Widget::new(WidgetKind::Streak),
            ],
            notification,
            admin_category_filter: CategoryFilter::All,
        }
    }

    pub fn goal(&self, goal_id: &str) -> Option<&Goal> {
        self.goals.iter().find(|g| g.id == goal_id)
    }

    pub fn goal_mut(&mut self, goal_id: &str) -> Option<&mut Goal> {
        self.goals.iter_mut().find(|g| g.id == goal_id)
    }

    pub fn entry(&self, date: &str) -> Option<&DailyEntry> {
        self.entries.iter().find(|e| e.date == date)
    }

    /// Entry for `date`, created in sorted position if missing
    pub fn entry_mut_or_insert(&mut self, date: &str) -> &mut DailyEntry {
        let idx = match self.entries.binary_search_by(|e| e.date.as_str().cmp(date)) {
            Ok(idx) => idx,
            Err(idx) => {
                self.entries.insert(idx, DailyEntry::new(date));
                idx
            }
        };
        &mut self.entries[idx]
    }

    /// Resolve a goal by id or by case-insensitive title
    pub fn find_goal_id(&self, needle: &str) -> Option<String> {
        self.goals
            .iter()
            .find(|g| g.id == needle)
            .or_else(|| self.goals.iter().find(|g| g.title.eq_ignore_ascii_case(needle)))
            .map(|g| g.id.clone())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::seeded()
    }
}
