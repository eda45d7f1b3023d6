//! Selected request tracking
//!
//! The selection stores the arrival index of a pair, not its position in the
//! filtered list, so it stays put while new traffic arrives or the filter
//! changes.

use super::store::RequestResponse;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    index: Option<usize>,
}

impl Selection {
    pub fn select(&mut self, index: usize) {
        self.index = Some(index);
    }

    pub fn clear(&mut self) {
        self.index = None;
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Look the selection up in the current joined list
    pub fn selected<'a>(&self, pairs: &'a [RequestResponse]) -> Option<&'a RequestResponse> {
        self.index.and_then(|i| pairs.get(i))
    }

    /// Move one entry down the projected list
    pub fn next(&mut self, view: &[(usize, &RequestResponse)]) {
        let target = match self.position(view) {
            Some(pos) => view.get(pos + 1).or(view.last()),
            None => view.first(),
        };
        if let Some((i, _)) = target {
            self.select(*i);
        }
    }

    /// Move one entry up the projected list
    pub fn previous(&mut self, view: &[(usize, &RequestResponse)]) {
        let target = match self.position(view) {
            Some(pos) => view.get(pos.saturating_sub(1)),
            None => view.first(),
        };
        if let Some((i, _)) = target {
            self.select(*i);
        }
    }

    pub fn first(&mut self, view: &[(usize, &RequestResponse)]) {
        if let Some((i, _)) = view.first() {
            self.select(*i);
        }
    }

    pub fn last(&mut self, view: &[(usize, &RequestResponse)]) {
        if let Some((i, _)) = view.last() {
            self.select(*i);
        }
    }

    /// Position of the selection within a projected list
    pub fn position(&self, view: &[(usize, &RequestResponse)]) -> Option<usize> {
        let index = self.index?;
        view.iter().position(|(i, _)| *i == index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::store::tests::request;
    use tunnelscope_common::Method;

    fn pairs() -> Vec<RequestResponse> {
        ["a", "b", "c"]
            .into_iter()
            .map(|id| RequestResponse {
                request: request(id, Method::Get, "/"),
                response: None,
            })
            .collect()
    }

    #[test]
    fn test_select_and_lookup() {
        let pairs = pairs();
        let mut selection = Selection::default();
        assert!(selection.selected(&pairs).is_none());

        selection.select(1);
        assert_eq!(selection.selected(&pairs).map(|p| p.request.id.as_str()), Some("b"));

        selection.select(7);
        assert!(selection.selected(&pairs).is_none());

        selection.clear();
        assert_eq!(selection.index(), None);
    }

    #[test]
    fn test_navigation_follows_projected_order() {
        let pairs = pairs();
        let view: Vec<_> = pairs.iter().enumerate().rev().collect();
        let mut selection = Selection::default();

        selection.next(&view);
        assert_eq!(selection.index(), Some(2));
        selection.next(&view);
        assert_eq!(selection.index(), Some(1));
        selection.last(&view);
        assert_eq!(selection.index(), Some(0));
        selection.next(&view);
        assert_eq!(selection.index(), Some(0));
        selection.previous(&view);
        assert_eq!(selection.index(), Some(1));
        selection.first(&view);
        assert_eq!(selection.index(), Some(2));
        selection.previous(&view);
        assert_eq!(selection.index(), Some(2));
    }

    #[test]
    fn test_selection_survives_filtered_out_entry() {
        let pairs = pairs();
        let mut selection = Selection::default();
        selection.select(1);

        let empty: Vec<(usize, &RequestResponse)> = Vec::new();
        selection.next(&empty);
        assert_eq!(selection.index(), Some(1));
        assert_eq!(selection.position(&empty), None);
    }
}
