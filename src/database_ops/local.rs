use async_trait::async_trait;

use super::provider::{Provider, ProviderError, RawRecord};

pub const LOCAL_SOURCE: &str = "local";

/// Fixture provider: returns the records it was built with. No I/O.
#[derive(Debug, Clone, Default)]
pub struct LocalProvider {
    records: Vec<RawRecord>,
}

impl LocalProvider {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records }
    }

    /// One demo company, enough to exercise the discovery path offline.
    pub fn demo_companies() -> Self {
        let mut rec = RawRecord::new(LOCAL_SOURCE, "Demo Milk Company");
        rec.external_id = Some("local-demo-1".to_string());
        rec.country = Some("RU".to_string());
        rec.region = Some("Москва".to_string());
        rec.website = Some("https://example.com".to_string());
        Self::new(vec![rec])
    }

    /// Small offer fixture for `query`, priced in RUB.
    pub fn demo_offers(query: &str, region: Option<&str>) -> Self {
        let items = [
            ("Молоко «Демо» пастеризованное 3.2% 1л", 89.9),
            ("Демо Ферма - кефир 1% 930 мл бутылка", 74.5),
            ("Творог «Демо» 9% 0,5 кг", 199.0),
        ];
        let records = items
            .iter()
            .enumerate()
            .map(|(i, (name, price))| {
                let mut rec = RawRecord::new(LOCAL_SOURCE, *name);
                rec.external_id = Some(format!("local-offer-{}", i + 1));
                rec.region = region.map(str::to_string);
                rec.price_value = Some(*price);
                rec.price_currency = Some("₽".to_string());
                rec.query = Some(query.to_string());
                rec
            })
            .collect();
        Self::new(records)
    }
}

#[async_trait]
impl Provider for LocalProvider {
    fn name(&self) -> &'static str {
        LOCAL_SOURCE
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, ProviderError> {
        Ok(self.records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_is_deterministic() {
        let p = LocalProvider::demo_offers("молоко", Some("Москва"));
        let a = p.fetch().await.unwrap();
        let b = p.fetch().await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        assert!(a.iter().all(|r| r.price_value.is_some()));
    }

    #[tokio::test]
    async fn demo_company_has_external_id() {
        let recs = LocalProvider::demo_companies().fetch().await.unwrap();
        assert_eq!(recs[0].name, "Demo Milk Company");
        assert_eq!(recs[0].external_id.as_deref(), Some("local-demo-1"));
    }
}
