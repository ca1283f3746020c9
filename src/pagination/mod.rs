use crate::state::PaginationState;

pub const PAGE_SIZE_OPTIONS: [usize; 8] = [5, 10, 20, 40, 50, 100, 200, 500];

pub fn page_count(total_count: u64, page_size: usize) -> usize {
    if total_count == 0 || page_size == 0 {
        return 0;
    }
    let pages = total_count.div_ceil(page_size as u64);
    usize::try_from(pages).unwrap_or(usize::MAX)
}

pub fn can_next_page(page_index: usize, page_count: usize) -> bool {
    page_index.saturating_add(1) < page_count
}

pub fn can_previous_page(page_index: usize) -> bool {
    page_index > 0
}

pub fn next_page(state: PaginationState, page_count: usize) -> PaginationState {
    if can_next_page(state.page_index(), page_count) {
        PaginationState::new(state.page_index() + 1, state.page_size())
    } else {
        state
    }
}

pub fn previous_page(state: PaginationState) -> PaginationState {
    if can_previous_page(state.page_index()) {
        PaginationState::new(state.page_index() - 1, state.page_size())
    } else {
        state
    }
}

// keeps the first row of the current page visible after the resize
pub fn with_page_size(state: PaginationState, page_size: usize) -> PaginationState {
    let next = PaginationState::new(0, page_size);
    // page numbers come straight from the URL, so this can be huge
    let top_row = state.page_index().saturating_mul(state.page_size());
    PaginationState::new(top_row / next.page_size(), next.page_size())
}
