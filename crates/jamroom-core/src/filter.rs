use std::collections::BTreeSet;

/// Genre constraint for public session listings, resolved once from the
/// request query.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum GenreFilter {
    /// No genre constraint.
    #[default]
    NoFilter,
    /// Exact, case-sensitive match on one tag.
    SingleTag(String),
    /// Match any of the tags. An empty set matches nothing.
    ManyTags(BTreeSet<String>),
}

impl GenreFilter {
    /// Resolve raw `genreTags` query values.
    ///
    /// Each value may itself be a comma-separated list; stored genres never
    /// contain a comma. Empty segments are dropped; if nothing remains the
    /// filter is `NoFilter`.
    pub fn from_query_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tags: BTreeSet<String> = BTreeSet::new();
        for value in values {
            for tag in value.as_ref().split(crate::session::GENRE_SEPARATOR) {
                if !tag.is_empty() {
                    let _ = tags.insert(tag.to_owned());
                }
            }
        }
        Self::from_tags(tags)
    }

    /// Pick the narrowest variant for a tag set.
    pub fn from_tags(tags: BTreeSet<String>) -> Self {
        match tags.len() {
            0 => Self::NoFilter,
            1 => match tags.into_iter().next() {
                Some(tag) => Self::SingleTag(tag),
                None => Self::NoFilter,
            },
            _ => Self::ManyTags(tags),
        }
    }

    /// Whether a record carrying `genres` passes the filter.
    pub fn matches(&self, genres: &[String]) -> bool {
        match self {
            Self::NoFilter => true,
            Self::SingleTag(tag) => genres.iter().any(|g| g == tag),
            Self::ManyTags(tags) => genres.iter().any(|g| tags.contains(g)),
        }
    }
}
