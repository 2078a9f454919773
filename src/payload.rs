//! The comparison payload sent by the front end.
//!
//! The rendering service owns the payload's schema and gets the original
//! request bytes. Here we only pick out what we read ourselves: the ids and
//! display name that go into the metadata row, and the plan price maps, which
//! we check against the tariff's periods when they're there. Every field is
//! optional and everything else is ignored.

use anyhow::{bail, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Access tariffs understood by the rendering service.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tariff {
    Td20,
    Td30,
    Td61,
}

const POWER_2_0: &[&str] = &["P1", "P2"];
const ENERGY_2_0: &[&str] = &["E1", "E2", "E3"];
const POWER_6: &[&str] = &["P1", "P2", "P3", "P4", "P5", "P6"];
const ENERGY_6: &[&str] = &["E1", "E2", "E3", "E4", "E5", "E6"];

impl FromStr for Tariff {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "2.0TD" => Ok(Tariff::Td20),
            "3.0TD" => Ok(Tariff::Td30),
            "6.1TD" => Ok(Tariff::Td61),
            other => bail!("unknown tariff `{other}`"),
        }
    }
}

impl Tariff {
    pub fn power_periods(&self) -> &'static [&'static str] {
        match self {
            Tariff::Td20 => POWER_2_0,
            Tariff::Td30 | Tariff::Td61 => POWER_6,
        }
    }

    pub fn energy_periods(&self) -> &'static [&'static str] {
        match self {
            Tariff::Td20 => ENERGY_2_0,
            Tariff::Td30 | Tariff::Td61 => ENERGY_6,
        }
    }
}

/// The price maps of one plan, keyed by period. Prices stay opaque.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PlanPrices {
    #[serde(default)]
    pub precio_potencia: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub precio_energia: Option<BTreeMap<String, Value>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SupplyInfo {
    #[serde(default)]
    pub nombre_cliente: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ComparisonPayload {
    #[serde(default)]
    pub tarifa: Option<String>,
    #[serde(default)]
    pub actual: Option<PlanPrices>,
    #[serde(default)]
    pub propuesta: Option<PlanPrices>,
    #[serde(default)]
    pub suministro: Option<SupplyInfo>,
    #[serde(default)]
    pub cliente_id: Option<String>,
    #[serde(default)]
    pub punto_id: Option<String>,
}

impl ComparisonPayload {
    /// Check that the plans price exactly the periods of the chosen tariff.
    ///
    /// The rendering service refuses payloads that don't, so there's no point
    /// in sending them. Tariffs we don't know and price maps that aren't
    /// there are left for the rendering service to judge.
    pub fn validate_periods(&self) -> Result<()> {
        let Some(tariff) = self.tarifa.as_deref().and_then(|t| t.parse::<Tariff>().ok()) else {
            return Ok(());
        };

        let power = tariff.power_periods();
        let energy = tariff.energy_periods();

        for (name, plan) in [("actual", &self.actual), ("propuesta", &self.propuesta)] {
            let Some(plan) = plan else { continue };

            if let Some(prices) = &plan.precio_energia {
                check_periods(prices, energy, &format!("{name}.precio_energia"))?;
            }

            if let Some(prices) = &plan.precio_potencia {
                check_periods(prices, power, &format!("{name}.precio_potencia"))?;
            }
        }

        Ok(())
    }

    /// The display name stored alongside the report, if the front end gave one.
    pub fn prospect_name(&self) -> Option<&str> {
        self.suministro
            .as_ref()?
            .nombre_cliente
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

fn check_periods(prices: &BTreeMap<String, Value>, expected: &[&str], field: &str) -> Result<()> {
    let unknown: Vec<&str> = prices
        .keys()
        .map(String::as_str)
        .filter(|k| !expected.contains(k))
        .collect();

    if !unknown.is_empty() {
        bail!("{field}: unknown periods {unknown:?}, expected {expected:?}");
    }

    let missing: Vec<&str> = expected
        .iter()
        .copied()
        .filter(|k| !prices.contains_key(*k))
        .collect();

    if !missing.is_empty() {
        bail!("{field}: missing periods {missing:?}, expected {expected:?}");
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn sample_json() -> Value {
        json!({
            "tarifa": "2.0TD",
            "consumo_mensual_kwh": {
                "ENE": [120.0, 80.5, 200.0],
                "FEB": [110.0, 75.0, 190.0]
            },
            "potencia_contratada_kw": { "ENE": 4.6, "FEB": 4.6 },
            "actual": {
                "nombre": "Comercializadora X",
                "precio_potencia": { "P1": 38.93, "P2": 20.69 },
                "precio_energia": { "E1": 0.17, "E2": 0.123, "E3": 0.123 },
                "cargos_fijos_anual_eur": 9.6
            },
            "propuesta": {
                "nombre": "Tarifa Pelito Eco",
                "precio_potencia": { "P1": 34.17, "P2": 3.12 },
                "precio_energia": { "E1": 0.098, "E2": 0.098, "E3": 0.098 }
            },
            "impuesto_electricidad_pct": 0.05112,
            "iva_pct": 0.21,
            "suministro": {
                "direccion": "Calle Mayor 1",
                "cif": "B12345678",
                "fecha_estudio": "2025-03-01",
                "poblacion": "Valencia",
                "cups": "ES0021000000000000AA",
                "nombre_cliente": "Panadería Sol"
            },
            "cliente_id": "c-1",
            "punto_id": "p-9"
        })
    }

    fn sample() -> ComparisonPayload {
        serde_json::from_value(sample_json()).unwrap()
    }

    fn prices(keys: &[&str]) -> Option<BTreeMap<String, Value>> {
        Some(keys.iter().map(|k| (k.to_string(), json!(1.0))).collect())
    }

    #[test]
    fn reads_only_what_it_needs() {
        let p = sample();
        assert_eq!(p.tarifa.as_deref(), Some("2.0TD"));
        assert_eq!(p.cliente_id.as_deref(), Some("c-1"));
        assert_eq!(p.punto_id.as_deref(), Some("p-9"));
        assert_eq!(p.prospect_name(), Some("Panadería Sol"));
    }

    #[test]
    fn tolerates_other_shapes() {
        let p: ComparisonPayload = serde_json::from_value(json!({
            "tarifa": "2.0TD",
            "energia_kwh": { "E1": 1000.0, "E2": 800.0, "E3": 1200.0 },
            "potencia_facturada_kw": { "P1": 4.6, "P2": 4.6 },
            "suministro": { "cups": "ES00" },
            "cliente_id": null
        }))
        .unwrap();
        assert_eq!(p.cliente_id, None);
        assert_eq!(p.prospect_name(), None);
        p.validate_periods().unwrap();

        let empty: ComparisonPayload = serde_json::from_value(json!({})).unwrap();
        empty.validate_periods().unwrap();
        assert_eq!(empty.prospect_name(), None);
    }

    #[test]
    fn tariff_codes() {
        assert_eq!("2.0TD".parse::<Tariff>().unwrap(), Tariff::Td20);
        assert_eq!("3.0TD".parse::<Tariff>().unwrap(), Tariff::Td30);
        assert_eq!("6.1TD".parse::<Tariff>().unwrap(), Tariff::Td61);
        assert!("4.0TD".parse::<Tariff>().is_err());
    }

    #[test]
    fn unknown_tariff_is_not_checked() {
        let mut p = sample();
        p.tarifa = Some("4.0TD".into());
        p.actual.as_mut().unwrap().precio_potencia = prices(&["X9"]);
        p.validate_periods().unwrap();
    }

    #[test]
    fn valid_periods_pass() {
        sample().validate_periods().unwrap();
    }

    #[test]
    fn unknown_period_is_reported() {
        let mut p = sample();
        p.actual.as_mut().unwrap().precio_potencia = prices(&["P1", "P2", "P3"]);
        let msg = p.validate_periods().unwrap_err().to_string();
        assert!(msg.starts_with("actual.precio_potencia: unknown periods"), "{msg}");
        assert!(msg.contains("\"P3\""));
    }

    #[test]
    fn missing_period_is_reported() {
        let mut p = sample();
        p.propuesta.as_mut().unwrap().precio_energia = prices(&["E1", "E3"]);
        let msg = p.validate_periods().unwrap_err().to_string();
        assert!(msg.starts_with("propuesta.precio_energia: missing periods"), "{msg}");
        assert!(msg.contains("\"E2\""));
    }

    #[test]
    fn absent_price_maps_are_skipped() {
        let mut p = sample();
        p.actual.as_mut().unwrap().precio_energia = None;
        p.propuesta = None;
        p.validate_periods().unwrap();
    }

    #[test]
    fn six_period_tariffs() {
        let mut p = sample();
        p.tarifa = Some("6.1TD".into());
        assert!(p.validate_periods().is_err());

        for plan in [p.actual.as_mut().unwrap(), p.propuesta.as_mut().unwrap()] {
            plan.precio_potencia = prices(POWER_6);
            plan.precio_energia = prices(ENERGY_6);
        }

        p.validate_periods().unwrap();
        p.tarifa = Some("3.0TD".into());
        p.validate_periods().unwrap();
    }

    #[test]
    fn prospect_name_ignores_blank() {
        let mut p = sample();
        p.suministro.as_mut().unwrap().nombre_cliente = Some("   ".into());
        assert_eq!(p.prospect_name(), None);
        p.suministro = None;
        assert_eq!(p.prospect_name(), None);
    }
}
