use zatca_derive::Validate;

#[derive(Validate)]
#[validate(non_empty, dn_safe)]
pub struct Subject {
    pub common_name: String,
    pub organization_name: String,
}

fn main() {
    let ok = Subject::new("EGS1-886431145".into(), "Acme Trading LTD".into());
    assert!(ok.is_ok());

    let empty = Subject::new("  ".into(), "Acme".into());
    assert!(empty.is_err());

    let injected = Subject::new("EGS1".into(), "Acme,O=Evil".into());
    assert!(injected.is_err());
}
