use zatca_derive::Validate;

#[derive(Debug)]
pub struct AmountError(String);

impl From<String> for AmountError {
    fn from(message: String) -> Self {
        AmountError(message)
    }
}

#[derive(Validate)]
#[validate_error(AmountError)]
pub struct Totals {
    #[validate(is_vat_number)]
    pub vat_number: String,
    #[validate(is_amount)]
    pub total: String,
}

fn main() {
    assert!(Totals::new("300000000000003".into(), "115.00".into()).is_ok());
    assert!(Totals::new("300000000000003".into(), "115".into()).is_ok());

    let err = Totals::new("3000".into(), "115.00".into()).err().unwrap();
    assert!(err.0.contains("vat_number"));

    assert!(Totals::new("300000000000003".into(), "11a.00".into()).is_err());
    assert!(Totals::new("300000000000003".into(), "115.".into()).is_err());
}
