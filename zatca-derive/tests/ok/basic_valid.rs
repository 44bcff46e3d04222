use zatca_derive::Validate;

#[derive(Validate)]
pub struct Seller {
    pub name: String,
    #[validate(is_vat_number)]
    pub vat_number: String,
}

fn main() {
    let ok = Seller::new("Acme Trading".into(), "399999999900003".into());
    assert!(ok.is_ok());

    let short = Seller::new("Acme Trading".into(), "39999".into());
    assert!(short.is_err());

    let letters = Seller::new("Acme Trading".into(), "3999999999OOOO3".into());
    assert!(letters.is_err());
}
