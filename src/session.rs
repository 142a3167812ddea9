use std::time::{Duration, Instant};

use regex::{Regex, RegexBuilder};

use crate::alerts::AlertCache;
use crate::record::{aggregate, sort_groups, sort_rows, GroupRecord, ProcRecord, SortKey};
use crate::tree::{build_tree, TreeNode};

pub const DEFAULT_REFRESH: f64 = 2.0;
pub const MIN_REFRESH: f64 = 1.0;
pub const MAX_REFRESH: f64 = 10.0;
const STATUS_TTL: Duration = Duration::from_secs(8);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum View {
    Groups,
    Detail,
}

/// The interactive view model. Holds every piece of state the loop
/// mutates and the latest snapshots it renders; no terminal types in
/// here so the whole state machine is testable directly.
pub struct Session {
    pub view: View,
    pub tree_mode: bool,
    pub detail_app: Option<String>,
    pub sel: usize,
    pub sort_key: SortKey,
    pub filter: Option<Regex>,
    pub filter_text: String,
    pub refresh_secs: f64,
    pub rows: Vec<ProcRecord>,
    pub groups: Vec<GroupRecord>,
    pub detail_list: Vec<ProcRecord>,
    pub detail_tree: Vec<TreeNode>,
    pub alerts: AlertCache,
    status_msg: String,
    status_at: Option<Instant>,
}

impl Session {
    pub fn new(filter_text: &str, sort_key: SortKey, refresh_secs: f64) -> Self {
        let mut s = Self {
            view: View::Groups,
            tree_mode: false,
            detail_app: None,
            sel: 0,
            sort_key,
            filter: None,
            filter_text: String::new(),
            refresh_secs: refresh_secs.clamp(MIN_REFRESH, MAX_REFRESH),
            rows: Vec::new(),
            groups: Vec::new(),
            detail_list: Vec::new(),
            detail_tree: Vec::new(),
            alerts: AlertCache::new(),
            status_msg: String::new(),
            status_at: None,
        };
        if !filter_text.is_empty() {
            s.set_filter(filter_text);
        }
        s
    }

    /// Length of the list the current view scrolls over.
    pub fn length(&self) -> usize {
        match self.view {
            View::Groups => self.groups.len(),
            View::Detail => {
                if self.tree_mode {
                    self.detail_tree.len()
                } else {
                    self.detail_list.len()
                }
            }
        }
    }

    /// Installs a fresh sampling pass: aggregates, re-sorts, rebuilds
    /// the detail snapshot and re-clamps the selection.
    pub fn apply_sample(&mut self, rows: Vec<ProcRecord>) {
        let mut groups = aggregate(&rows);
        sort_groups(&mut groups, self.sort_key);
        self.groups = groups;
        self.rows = rows;
        self.rebuild_detail();
        self.clamp_selection();
    }

    fn rebuild_detail(&mut self) {
        let Some(app) = self.detail_app.as_deref() else {
            self.detail_list.clear();
            self.detail_tree.clear();
            return;
        };
        let mut list: Vec<ProcRecord> = self.rows.iter().filter(|r| r.app == app).cloned().collect();
        if self.tree_mode {
            self.detail_tree = build_tree(&list, self.sort_key);
        } else {
            sort_rows(&mut list, self.sort_key);
            self.detail_tree.clear();
        }
        self.detail_list = list;
    }

    fn clamp_selection(&mut self) {
        let len = self.length();
        self.sel = if len == 0 { 0 } else { self.sel.min(len - 1) };
    }

    pub fn move_selection(&mut self, delta: isize) {
        let len = self.length();
        if len == 0 {
            self.sel = 0;
            return;
        }
        let sel = self.sel as isize + delta;
        self.sel = sel.clamp(0, len as isize - 1) as usize;
    }

    pub fn select_home(&mut self) {
        self.sel = 0;
    }

    pub fn select_end(&mut self) {
        self.sel = self.length().saturating_sub(1);
    }

    /// groups -> detail on the selected group. Selection and tree
    /// toggle reset so the detail view always opens flat at the top.
    pub fn enter_detail(&mut self) {
        if self.view != View::Groups || self.groups.is_empty() {
            return;
        }
        self.detail_app = Some(self.groups[self.sel].app.clone());
        self.view = View::Detail;
        self.sel = 0;
        self.tree_mode = false;
        self.rebuild_detail();
    }

    /// detail -> groups; forgets the chosen application.
    pub fn leave_detail(&mut self) {
        if self.view != View::Detail {
            return;
        }
        self.view = View::Groups;
        self.detail_app = None;
        self.sel = 0;
        self.tree_mode = false;
        self.detail_list.clear();
        self.detail_tree.clear();
    }

    pub fn toggle_tree(&mut self) {
        if self.view != View::Detail {
            return;
        }
        self.tree_mode = !self.tree_mode;
        self.rebuild_detail();
        self.clamp_selection();
        let on = if self.tree_mode { "ON" } else { "OFF" };
        self.status(format!("Tree view: {on}"));
    }

    pub fn cycle_sort(&mut self) {
        self.sort_key = self.sort_key.next();
        self.sel = 0;
        sort_groups(&mut self.groups, self.sort_key);
        self.rebuild_detail();
        self.status(format!("Sort: {}", self.sort_key.label()));
    }

    /// Compiles a case-insensitive filter. An invalid pattern resets
    /// the filter entirely and tells the user; it never carries over.
    pub fn set_filter(&mut self, text: &str) {
        let text = text.trim();
        self.sel = 0;
        if text.is_empty() {
            self.clear_filter();
            return;
        }
        match RegexBuilder::new(text).case_insensitive(true).build() {
            Ok(re) => {
                self.filter = Some(re);
                self.filter_text = text.to_string();
                self.status(format!("Filter: {text}"));
            }
            Err(_) => {
                self.filter = None;
                self.filter_text.clear();
                self.status("Filter invalid".to_string());
            }
        }
    }

    pub fn clear_filter(&mut self) {
        self.filter = None;
        self.filter_text.clear();
        self.sel = 0;
        self.status("Filter cleared".to_string());
    }

    pub fn adjust_refresh(&mut self, delta: f64) {
        self.refresh_secs = (self.refresh_secs + delta).clamp(MIN_REFRESH, MAX_REFRESH);
        self.status(format!("Refresh: {:.1}s", self.refresh_secs));
    }

    /// The process the cursor is on in detail view, from whichever list
    /// is actually displayed.
    pub fn selected_process(&self) -> Option<&ProcRecord> {
        if self.view != View::Detail {
            return None;
        }
        if self.tree_mode {
            self.detail_tree.get(self.sel).map(|n| &n.record)
        } else {
            self.detail_list.get(self.sel)
        }
    }

    pub fn selected_group(&self) -> Option<&GroupRecord> {
        if self.view != View::Groups {
            return None;
        }
        self.groups.get(self.sel)
    }

    pub fn status(&mut self, msg: String) {
        self.status_msg = msg;
        self.status_at = Some(Instant::now());
    }

    pub fn status_line(&self, now: Instant) -> Option<&str> {
        let at = self.status_at?;
        if now.duration_since(at) < STATUS_TTL {
            Some(&self.status_msg)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_row;

    fn sample_rows() -> Vec<ProcRecord> {
        vec![
            test_row(1, 0, "foo", 100.0),
            test_row(2, 1, "foo", 50.0),
            test_row(3, 0, "bar", 200.0),
        ]
    }

    fn session_with_sample() -> Session {
        let mut s = Session::new("", SortKey::Rss, DEFAULT_REFRESH);
        s.apply_sample(sample_rows());
        s
    }

    #[test]
    fn groups_sorted_by_current_key() {
        let s = session_with_sample();
        assert_eq!(s.groups[0].app, "bar");
        assert_eq!(s.groups[1].app, "foo");
    }

    #[test]
    fn selection_clamped_when_list_shrinks() {
        let mut s = session_with_sample();
        s.select_end();
        assert_eq!(s.sel, 1);
        s.apply_sample(vec![test_row(3, 0, "bar", 200.0)]);
        assert_eq!(s.sel, 0);
        s.apply_sample(vec![]);
        assert_eq!(s.sel, 0);
        assert_eq!(s.length(), 0);
    }

    #[test]
    fn move_selection_stays_in_bounds() {
        let mut s = session_with_sample();
        s.move_selection(10);
        assert_eq!(s.sel, s.length() - 1);
        s.move_selection(-10);
        assert_eq!(s.sel, 0);
    }

    #[test]
    fn detail_round_trip_resets_state() {
        let mut s = session_with_sample();
        s.enter_detail();
        assert_eq!(s.view, View::Detail);
        assert_eq!(s.detail_app.as_deref(), Some("bar"));
        assert_eq!(s.sel, 0);
        assert!(!s.tree_mode);
        s.toggle_tree();
        assert!(s.tree_mode);
        s.leave_detail();
        assert_eq!(s.view, View::Groups);
        assert_eq!(s.detail_app, None);
        assert!(!s.tree_mode);
        assert_eq!(s.sel, 0);
    }

    #[test]
    fn detail_lists_only_the_chosen_app() {
        let mut s = session_with_sample();
        s.sel = 1; //foo
        s.enter_detail();
        assert_eq!(s.detail_app.as_deref(), Some("foo"));
        assert_eq!(s.detail_list.len(), 2);
        assert!(s.detail_list.iter().all(|r| r.app == "foo"));
        //flat detail sorted by rss descending
        assert_eq!(s.detail_list[0].pid, 1);
    }

    #[test]
    fn tree_toggle_builds_tree_over_same_rows() {
        let mut s = session_with_sample();
        s.sel = 1;
        s.enter_detail();
        s.toggle_tree();
        assert_eq!(s.detail_tree.len(), 2);
        assert_eq!(s.length(), 2);
        assert_eq!(s.detail_tree[0].record.pid, 1);
        assert_eq!(s.detail_tree[1].depth, 1);
    }

    #[test]
    fn cycle_sort_resets_selection_and_resorts() {
        let mut s = session_with_sample();
        s.select_end();
        let before = s.sort_key;
        s.cycle_sort();
        assert_ne!(s.sort_key, before);
        assert_eq!(s.sel, 0);
    }

    #[test]
    fn invalid_filter_resets_and_notifies() {
        let mut s = session_with_sample();
        s.set_filter("va[lid");
        assert!(s.filter.is_none());
        assert!(s.filter_text.is_empty());
        assert_eq!(s.status_line(Instant::now()), Some("Filter invalid"));
    }

    #[test]
    fn valid_filter_is_case_insensitive() {
        let mut s = session_with_sample();
        s.set_filter("FOO");
        assert!(s.filter.as_ref().unwrap().is_match("foobar"));
    }

    #[test]
    fn refresh_is_bounded() {
        let mut s = session_with_sample();
        for _ in 0..200 {
            s.adjust_refresh(0.1);
        }
        assert!((s.refresh_secs - MAX_REFRESH).abs() < 1e-9);
        for _ in 0..200 {
            s.adjust_refresh(-0.1);
        }
        assert!((s.refresh_secs - MIN_REFRESH).abs() < 1e-9);
    }

    #[test]
    fn status_expires() {
        let mut s = session_with_sample();
        s.status("hello".to_string());
        let now = Instant::now();
        assert_eq!(s.status_line(now), Some("hello"));
        assert_eq!(s.status_line(now + Duration::from_secs(9)), None);
    }

    #[test]
    fn selected_process_follows_visible_list() {
        let mut s = session_with_sample();
        s.sel = 1;
        s.enter_detail();
        s.sel = 1;
        let flat_pid = s.selected_process().unwrap().pid;
        assert_eq!(flat_pid, 2);
        s.toggle_tree();
        let tree_pid = s.selected_process().unwrap().pid;
        assert_eq!(tree_pid, s.detail_tree[1].record.pid);
    }

    #[test]
    fn enter_detail_on_empty_groups_is_a_noop() {
        let mut s = Session::new("", SortKey::Rss, DEFAULT_REFRESH);
        s.enter_detail();
        assert_eq!(s.view, View::Groups);
    }
}
