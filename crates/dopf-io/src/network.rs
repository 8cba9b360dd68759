use std::{fs, path::Path};

use anyhow::{anyhow, Context, Result};
use dopf_core::{
    Bus, BusId, BusKind, Coordinate, Line, LineKind, NetworkModel, PhaseSet, SquareMatrix, C64,
};
use tracing::{debug, warn};

use crate::grammar::{parse_document, Element};

/// Read `network.txt` and return the breadth-first sorted model.
pub fn read_network(path: &Path) -> Result<NetworkModel> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading network file {}", path.display()))?;
    parse_network(&text).with_context(|| format!("parsing network file {}", path.display()))
}

/// Build a sorted model from the `<network>` grammar.
///
/// Buses are added first, then lines, so a line may name a bus that appears
/// later in the file.
pub fn parse_network(input: &str) -> Result<NetworkModel> {
    let root = parse_document(input)?;
    root.expect_tag("network")?;

    let mut model = NetworkModel::new();
    let mut lines = Vec::new();
    for element in &root.children {
        let kind = match element.tag.as_str() {
            "substation" => BusKind::Substation,
            "bus" => BusKind::Bus,
            "house" => BusKind::House,
            "line" => {
                lines.push(element);
                continue;
            }
            other => {
                warn!(tag = other, "ignoring unknown network element");
                continue;
            }
        };
        let bus = parse_bus(element, kind)?;
        model.add_bus(bus)?;
    }

    for element in lines {
        let line = parse_line(element, &model)?;
        model.add_line(line)?;
    }

    model
        .sort_by_breadth_first_search()
        .context("network is not a connected radial feeder")?;
    debug!(
        buses = model.num_buses(),
        lines = model.num_lines(),
        "parsed network"
    );
    Ok(model)
}

fn parse_phase(element: &Element) -> Result<PhaseSet> {
    let text = element.text_of("phase")?;
    Ok(PhaseSet::parse(text)?)
}

fn parse_bus(element: &Element, kind: BusKind) -> Result<Bus> {
    let name = element.text_of("name")?;
    let phase = parse_phase(element).with_context(|| format!("bus '{}'", name))?;
    let n = phase.len();
    let mut bus = Bus::new(name, phase, kind);

    if let Some(coordinate) = element.child("coordinate") {
        let xy = coordinate.values::<f64>(2)?;
        bus = bus.with_coordinate(Coordinate::new(xy[0], xy[1]));
    }
    if let Some(susceptance) = element.child("b") {
        let b = susceptance
            .values::<f64>(n * n)
            .with_context(|| format!("shunt of bus '{}'", name))?;
        let admittance = b.into_iter().map(|b| C64::new(0.0, b)).collect();
        bus = bus.with_shunt(SquareMatrix::from_row_major(n, admittance));
    }
    Ok(bus)
}

fn parse_line(element: &Element, model: &NetworkModel) -> Result<Line> {
    let name = element.text_of("name")?;
    let phase = parse_phase(element).with_context(|| format!("line '{}'", name))?;
    let n = phase.len();

    let resolve = |tag: &str| -> Result<BusId> {
        let bus_name = element.text_of(tag)?;
        model
            .bus_id(bus_name)
            .ok_or_else(|| anyhow!("line '{}' refers to unknown bus '{}'", name, bus_name))
    };
    let from = resolve("fromBusName")?;
    let to = resolve("toBusName")?;

    let r = element
        .required("r")?
        .values::<f64>(n * n)
        .with_context(|| format!("resistance of line '{}'", name))?;
    let x = element
        .required("x")?
        .values::<f64>(n * n)
        .with_context(|| format!("reactance of line '{}'", name))?;
    let impedance = r.into_iter().zip(x).map(|(r, x)| C64::new(r, x)).collect();

    Ok(Line::new(
        name,
        phase,
        LineKind::Line,
        from,
        to,
        SquareMatrix::from_row_major(n, impedance),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEEDER: &str = r#"
<network>
  <house>
    <name> h1 </name>
    <phase> b </phase>
    <coordinate> 3 1 </coordinate>
  </house>
  <line>
    <name> l2 </name>
    <phase> b </phase>
    <fromBusName> h1 </fromBusName>
    <toBusName> n1 </toBusName>
    <r> 0.02 </r>
    <x> 0.01 </x>
  </line>
  <substation>
    <name> sub </name>
    <phase> abc </phase>
  </substation>
  <bus>
    <name> n1 </name>
    <phase> ab </phase>
    <b> 0 0.1 0.1 0 </b>
  </bus>
  <line>
    <name> l1 </name>
    <phase> ab </phase>
    <fromBusName> sub </fromBusName>
    <toBusName> n1 </toBusName>
    <r> 0.01 0 0 0.01 </r>
    <x> 0.02 0 0 0.02 </x>
  </line>
</network>
"#;

    #[test]
    fn test_parse_sorts_and_reorients() {
        let model = parse_network(FEEDER).unwrap();
        let names: Vec<&str> = model.buses().iter().map(|bus| bus.name.as_str()).collect();
        assert_eq!(names, vec!["sub", "n1", "h1"]);
        let l2 = &model.lines()[1];
        assert_eq!(l2.name, "l2");
        assert_eq!(model.bus(l2.from).name, "n1");
        assert_eq!(model.bus(l2.to).name, "h1");
        assert_eq!(model.buses()[2].coordinate, Coordinate::new(3.0, 1.0));
    }

    #[test]
    fn test_shunt_is_susceptance() {
        let model = parse_network(FEEDER).unwrap();
        let shunt = &model.buses()[1].shunt;
        assert_eq!(shunt[(0, 1)], C64::new(0.0, 0.1));
        assert_eq!(shunt[(0, 0)], C64::new(0.0, 0.0));
    }

    #[test]
    fn test_unknown_bus_reported() {
        let input = FEEDER.replace("<toBusName> n1 </toBusName>\n    <r> 0.02", "<toBusName> nowhere </toBusName>\n    <r> 0.02");
        let err = parse_network(&input).unwrap_err();
        assert!(format!("{:#}", err).contains("unknown bus 'nowhere'"));
    }

    #[test]
    fn test_wrong_root_rejected() {
        assert!(parse_network("<LoadFile></LoadFile>").is_err());
    }
}
