use blogicum_web::pagination::{POSTS_PER_PAGE, Page, Paginator};

#[test]
fn test_default_page_size_is_ten() {
    assert_eq!(Paginator::default().per_page(), POSTS_PER_PAGE);
    assert_eq!(POSTS_PER_PAGE, 10);
}

#[test]
fn test_num_pages() {
    let paginator = Paginator::default();
    assert_eq!(paginator.num_pages(0), 1);
    assert_eq!(paginator.num_pages(10), 1);
    assert_eq!(paginator.num_pages(11), 2);
    assert_eq!(paginator.num_pages(25), 3);
}

#[test]
fn test_window_resolves_tokens_leniently() {
    let paginator = Paginator::default();

    assert_eq!(paginator.window(25, None).number, 1);
    assert_eq!(paginator.window(25, Some("2")).number, 2);
    assert_eq!(paginator.window(25, Some(" 3 ")).number, 3);
    assert_eq!(paginator.window(25, Some("x")).number, 1);
    assert_eq!(paginator.window(25, Some("")).number, 1);
    assert_eq!(paginator.window(25, Some("4")).number, 3);
    assert_eq!(paginator.window(25, Some("0")).number, 3);
    assert_eq!(paginator.window(25, Some("-1")).number, 3);
}

#[test]
fn test_window_offsets() {
    let window = Paginator::default().window(25, Some("3"));
    assert_eq!(window.offset, 20);
    assert_eq!(window.limit, 10);
    assert_eq!(window.count, 25);
}

#[test]
fn test_empty_collection_has_single_empty_page() {
    let window = Paginator::default().window(0, Some("5"));
    let page: Page<i64> = Page::new(vec![], window);

    assert_eq!(page.number, 1);
    assert_eq!(page.num_pages, 1);
    assert!(!page.has_next);
    assert!(!page.has_previous);
}

#[test]
fn test_page_navigation() {
    let paginator = Paginator::new(2);

    let middle = Page::new(vec![3, 4], paginator.window(5, Some("2")));
    assert!(middle.has_next);
    assert!(middle.has_previous);
    assert_eq!(middle.next_page_number, Some(3));
    assert_eq!(middle.previous_page_number, Some(1));

    let last = Page::new(vec![5], paginator.window(5, Some("3")));
    assert!(!last.has_next);
    assert_eq!(last.next_page_number, None);
}

#[test]
fn test_page_size_is_at_least_one() {
    assert_eq!(Paginator::new(0).per_page(), 1);
}
