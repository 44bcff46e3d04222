use chrono::{DateTime, TimeZone, Timelike, Utc};
use zatca_derive::Validate;

#[derive(Validate)]
pub struct Stamp {
    #[validate(non_empty)]
    pub label: String,
    #[validate(whole_seconds)]
    pub issued_at: DateTime<Utc>,
}

fn main() {
    let precise = Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 5).unwrap()
        + chrono::Duration::milliseconds(750);
    let stamp = Stamp::new("invoice".into(), precise).unwrap();
    assert_eq!(stamp.issued_at.nanosecond(), 0);
    assert_eq!(stamp.issued_at.second(), 5);

    assert!(Stamp::new("".into(), precise).is_err());
}
