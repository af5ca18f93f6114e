//! User profile and profile field models.

use serde::{Deserialize, Serialize};

/// One of the four profile fields collected during onboarding.
///
/// The variant order is the collection order: date → time → place → name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    BirthDate,
    BirthTime,
    BirthPlace,
    FullName,
}

impl ProfileField {
    /// Every field, in collection order.
    pub const ORDER: [ProfileField; 4] = [
        ProfileField::BirthDate,
        ProfileField::BirthTime,
        ProfileField::BirthPlace,
        ProfileField::FullName,
    ];

    /// Column name in the `profiles` table.
    pub fn column(&self) -> &'static str {
        match self {
            Self::BirthDate => "birth_date",
            Self::BirthTime => "birth_time",
            Self::BirthPlace => "birth_place",
            Self::FullName => "full_name",
        }
    }

    /// Human-readable label used in prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::BirthDate => "生年月日",
            Self::BirthTime => "出生時刻",
            Self::BirthPlace => "出生地",
            Self::FullName => "氏名",
        }
    }

    /// Free-text fields take any non-blank answer as-is.
    pub fn is_free_text(&self) -> bool {
        matches!(self, Self::BirthPlace | Self::FullName)
    }

    /// The field collected after this one, if any.
    pub fn next(&self) -> Option<ProfileField> {
        match self {
            Self::BirthDate => Some(Self::BirthTime),
            Self::BirthTime => Some(Self::BirthPlace),
            Self::BirthPlace => Some(Self::FullName),
            Self::FullName => None,
        }
    }
}

impl std::fmt::Display for ProfileField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// Decrypted profile for one user.
///
/// `None` marks a field the user has not provided yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub user_id: String,
    pub birth_date: Option<String>,
    pub birth_time: Option<String>,
    pub birth_place: Option<String>,
    pub full_name: Option<String>,
}

impl UserProfile {
    /// A fresh, all-unset profile.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, field: ProfileField) -> Option<&str> {
        match field {
            ProfileField::BirthDate => self.birth_date.as_deref(),
            ProfileField::BirthTime => self.birth_time.as_deref(),
            ProfileField::BirthPlace => self.birth_place.as_deref(),
            ProfileField::FullName => self.full_name.as_deref(),
        }
    }

    pub fn set(&mut self, field: ProfileField, value: Option<String>) {
        let slot = match field {
            ProfileField::BirthDate => &mut self.birth_date,
            ProfileField::BirthTime => &mut self.birth_time,
            ProfileField::BirthPlace => &mut self.birth_place,
            ProfileField::FullName => &mut self.full_name,
        };
        *slot = value;
    }

    /// First unset field in collection order; `None` once the profile is complete.
    pub fn next_missing_field(&self) -> Option<ProfileField> {
        ProfileField::ORDER
            .into_iter()
            .find(|field| self.get(*field).is_none())
    }

    pub fn is_complete(&self) -> bool {
        self.next_missing_field().is_none()
    }

    /// Render the profile as a bullet list for prompt injection.
    pub fn to_prompt_section(&self) -> String {
        ProfileField::ORDER
            .into_iter()
            .map(|field| {
                format!(
                    "- {}: {}",
                    field.label(),
                    self.get(field).unwrap_or("不明")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_profile() -> UserProfile {
        UserProfile {
            user_id: "U1".into(),
            birth_date: Some("1990-01-01".into()),
            birth_time: Some("14:30".into()),
            birth_place: Some("東京都".into()),
            full_name: Some("山田太郎".into()),
        }
    }

    #[test]
    fn new_profile_is_all_unset() {
        let p = UserProfile::new("U1");
        assert_eq!(p.user_id, "U1");
        for field in ProfileField::ORDER {
            assert!(p.get(field).is_none());
        }
        assert_eq!(p.next_missing_field(), Some(ProfileField::BirthDate));
        assert!(!p.is_complete());
    }

    #[test]
    fn next_missing_field_follows_fixed_order() {
        let mut p = UserProfile::new("U1");
        let mut seen = Vec::new();
        while let Some(field) = p.next_missing_field() {
            seen.push(field);
            p.set(field, Some("x".into()));
        }
        assert_eq!(seen, ProfileField::ORDER.to_vec());
        assert!(p.is_complete());
    }

    #[test]
    fn next_missing_field_returns_earliest_gap() {
        // Out-of-order data (e.g. a manually edited row) still asks for the earliest gap.
        let mut p = complete_profile();
        p.set(ProfileField::BirthTime, None);
        p.set(ProfileField::FullName, None);
        assert_eq!(p.next_missing_field(), Some(ProfileField::BirthTime));
        assert_eq!(p.next_missing_field(), p.next_missing_field());
    }

    #[test]
    fn complete_profile_has_no_missing_field() {
        assert_eq!(complete_profile().next_missing_field(), None);
    }

    #[test]
    fn next_walks_all_fields() {
        let mut current = ProfileField::BirthDate;
        let mut walked = vec![current];
        while let Some(next) = current.next() {
            walked.push(next);
            current = next;
        }
        assert_eq!(walked, ProfileField::ORDER.to_vec());
    }

    #[test]
    fn only_place_and_name_are_free_text() {
        let free: Vec<ProfileField> = ProfileField::ORDER
            .into_iter()
            .filter(ProfileField::is_free_text)
            .collect();
        assert_eq!(free, vec![ProfileField::BirthPlace, ProfileField::FullName]);
    }

    #[test]
    fn display_matches_serde() {
        for field in ProfileField::ORDER {
            let json = serde_json::to_string(&field).unwrap();
            assert_eq!(format!("\"{field}\""), json);
        }
    }

    #[test]
    fn prompt_section_lists_every_field() {
        let section = complete_profile().to_prompt_section();
        assert!(section.contains("生年月日: 1990-01-01"));
        assert!(section.contains("出生時刻: 14:30"));
        assert!(section.contains("出生地: 東京都"));
        assert!(section.contains("氏名: 山田太郎"));

        let partial = UserProfile::new("U2").to_prompt_section();
        assert_eq!(partial.matches("不明").count(), 4);
    }
}
