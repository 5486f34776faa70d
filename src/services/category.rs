/// Maps a `>`-delimited category path onto a coarse search keyword.
///
/// Keyword families are a data table so rules stay testable and easy to
/// localize; order inside the table is the match priority within one
/// path segment.
const KEYWORD_FAMILIES: &[(&str, &[&str])] = &[
    ("카페", &["카페"]),
    ("술집", &["바", "술", "맥주"]),
    ("식당", &["식당", "한식", "일식", "중식", "양식", "분식"]),
    ("베이커리", &["베이커리", "빵"]),
    ("디저트", &["디저트"]),
];

/// Normalizes a category path like `"음식점 > 카페 > 커피전문점"` into a
/// keyword usable as a search query.
///
/// Segments are scanned from most specific to least specific; the first
/// segment matching a keyword family wins. When nothing matches, the most
/// specific segment itself is returned as a last resort.
pub fn normalize_category_keyword(category_path: &str) -> Option<String> {
    let segments: Vec<&str> = category_path
        .split('>')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if segments.is_empty() {
        return None;
    }

    for segment in segments.iter().rev() {
        for (keyword, markers) in KEYWORD_FAMILIES {
            if markers.iter().any(|m| segment.contains(m)) {
                return Some((*keyword).to_string());
            }
        }
    }

    segments.last().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cafe_path() {
        assert_eq!(
            normalize_category_keyword("음식점 > 카페 > 커피전문점 > 스타벅스"),
            Some("카페".to_string())
        );
    }

    #[test]
    fn test_cuisine_maps_to_restaurant() {
        assert_eq!(
            normalize_category_keyword("음식점 > 한식 > 육류,고기"),
            Some("식당".to_string())
        );
        assert_eq!(
            normalize_category_keyword("음식점 > 분식"),
            Some("식당".to_string())
        );
    }

    #[test]
    fn test_bar_markers() {
        assert_eq!(
            normalize_category_keyword("음식점 > 술집 > 호프,요리주점"),
            Some("술집".to_string())
        );
        assert_eq!(
            normalize_category_keyword("음식점 > 맥주전문점"),
            Some("술집".to_string())
        );
    }

    #[test]
    fn test_bakery_and_dessert() {
        assert_eq!(
            normalize_category_keyword("음식점 > 카페 > 제과,베이커리"),
            // Most specific segment wins: the bakery leaf sits below 카페.
            Some("베이커리".to_string())
        );
        assert_eq!(
            normalize_category_keyword("음식점 > 간식 > 디저트가게"),
            Some("디저트".to_string())
        );
    }

    #[test]
    fn test_unmatched_path_falls_back_to_leaf() {
        assert_eq!(
            normalize_category_keyword("여행 > 관광,명소 > 전망대"),
            Some("전망대".to_string())
        );
    }

    #[test]
    fn test_blank_path() {
        assert_eq!(normalize_category_keyword(""), None);
        assert_eq!(normalize_category_keyword(" > > "), None);
    }
}
