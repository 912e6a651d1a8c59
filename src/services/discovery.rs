//! Discovery: walks each installation's page configuration once and builds the
//! flat table of normalized inputs.

use crate::client::{FebosApi, FebosClientError};
use crate::models::entity::{DeviceInfo, EntityDescriptor, EntityKind, StateValue};
use crate::models::febos::{DeviceId, InstallationId, PageConfig, ThingId};
use crate::normalization::input::{InputIdentity, NormalizedInput};
use crate::normalization::resolver::{ClassificationError, ResolverTables};
use crate::utils::unique_key;
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::error::Error;
use std::fmt::{self, Display, Formatter};

#[derive(Debug)]
pub enum DiscoveryError {
    Api(FebosClientError),
    /// A thing whose owning device is missing from the device map.
    ThingWithoutDevice {
        installation_id: InstallationId,
        thing_id: ThingId,
        device_id: DeviceId,
    },
    /// An input referencing a device/thing pair that was never registered.
    UnregisteredThing {
        installation_id: InstallationId,
        device_id: DeviceId,
        thing_id: ThingId,
        code: String,
    },
    Classification {
        installation_id: InstallationId,
        key: String,
        source: ClassificationError,
    },
}

impl Display for DiscoveryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::Api(e) => write!(f, "api error: {}", e),
            DiscoveryError::ThingWithoutDevice {
                installation_id,
                thing_id,
                device_id,
            } => write!(
                f,
                "thing {} of installation {} references unknown device {}",
                thing_id.0, installation_id.0, device_id.0
            ),
            DiscoveryError::UnregisteredThing {
                installation_id,
                device_id,
                thing_id,
                code,
            } => write!(
                f,
                "device not found for input: installation_id={}, device_id={}, thing_id={}, code={}",
                installation_id.0, device_id.0, thing_id.0, code
            ),
            DiscoveryError::Classification {
                installation_id,
                key,
                source,
            } => write!(
                f,
                "cannot classify {} of installation {}: {}",
                key, installation_id.0, source
            ),
        }
    }
}

impl Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DiscoveryError::Api(e) => Some(e),
            DiscoveryError::Classification { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<FebosClientError> for DiscoveryError {
    fn from(value: FebosClientError) -> Self {
        DiscoveryError::Api(value)
    }
}

/// Everything discovered for one installation.
#[derive(Debug, Default)]
pub struct InstallationDiscovery {
    pub groups: BTreeSet<String>,
    pub devices: BTreeMap<(DeviceId, ThingId), DeviceInfo>,
    pub inputs: Vec<NormalizedInput>,
}

/// The flat table of normalized inputs, keyed by composite identity.
/// Replaced wholesale on every discovery.
#[derive(Debug, Default)]
pub struct InputTable {
    pub installations: Vec<InstallationId>,
    pub groups: BTreeMap<InstallationId, BTreeSet<String>>,
    pub devices: BTreeMap<String, DeviceInfo>,
    inputs: BTreeMap<InputIdentity, NormalizedInput>,
    keys: HashMap<String, InputIdentity>,
    /// Installations whose configuration could not be reconciled.
    pub failed: Vec<(InstallationId, DiscoveryError)>,
}

impl InputTable {
    fn insert(&mut self, input: NormalizedInput) {
        self.keys.insert(input.key.clone(), input.identity.clone());
        self.inputs.insert(input.identity.clone(), input);
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn get_mut(&mut self, identity: &InputIdentity) -> Option<&mut NormalizedInput> {
        self.inputs.get_mut(identity)
    }

    pub fn by_key(&self, key: &str) -> Option<&NormalizedInput> {
        self.keys.get(key).and_then(|id| self.inputs.get(id))
    }

    pub fn by_key_mut(&mut self, key: &str) -> Option<&mut NormalizedInput> {
        let id = self.keys.get(key)?;
        self.inputs.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NormalizedInput> {
        self.inputs.values()
    }

    /// Current host value of every known input, including never-observed ones.
    pub fn projection(&self) -> BTreeMap<String, Option<StateValue>> {
        self.inputs
            .values()
            .map(|i| (i.key.clone(), i.normalized_value()))
            .collect()
    }

    /// Full projection plus the keys whose value changed in the last mutation.
    pub fn applied(&self, changed: Vec<String>) -> Applied {
        Applied {
            values: self.projection(),
            changed,
        }
    }

    pub fn descriptors(&self, kind: Option<EntityKind>) -> Vec<EntityDescriptor> {
        self.inputs
            .values()
            .filter(|i| kind.is_none_or(|k| i.kind() == k))
            .map(NormalizedInput::descriptor)
            .collect()
    }
}

/// Outcome of a refresh or write: the complete projection and which keys moved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Applied {
    pub values: BTreeMap<String, Option<StateValue>>,
    pub changed: Vec<String>,
}

/// Run discovery for every installation.
///
/// Transport failures abort the whole pass (nothing is returned). Configuration
/// inconsistencies fail only the affected installation, which then contributes
/// no inputs at all and is listed in `failed`.
pub fn discover<A: FebosApi + ?Sized>(
    api: &A,
    installations: &[InstallationId],
    tables: &ResolverTables,
) -> Result<InputTable, DiscoveryError> {
    let mut table = InputTable {
        installations: installations.to_vec(),
        ..InputTable::default()
    };

    for installation_id in installations {
        debug!("Device discovery started for installation {}", installation_id.0);
        let page_config = api.get_page_config(*installation_id)?;
        match discover_installation(*installation_id, &page_config, tables) {
            Ok(found) => {
                info!(
                    "Installation {}: {} input(s), {} group(s), {} thing(s)",
                    installation_id.0,
                    found.inputs.len(),
                    found.groups.len(),
                    found.devices.len()
                );
                for ((device_id, thing_id), info) in found.devices {
                    table
                        .devices
                        .insert(unique_key(*installation_id, device_id, thing_id, None), info);
                }
                table.groups.insert(*installation_id, found.groups);
                for input in found.inputs {
                    table.insert(input);
                }
            }
            Err(e) => {
                error!("Discovery failed for installation {}: {}", installation_id.0, e);
                table.failed.push((*installation_id, e));
            }
        }
    }

    if table.is_empty() {
        warn!("Discovery found no inputs");
    } else {
        debug!("Loaded {} inputs", table.len());
    }
    Ok(table)
}

/// Walk one page configuration: things first, then every page, tab, widget and
/// input group. The first occurrence of a (device, thing, code) triple wins.
pub fn discover_installation(
    installation_id: InstallationId,
    page_config: &PageConfig,
    tables: &ResolverTables,
) -> Result<InstallationDiscovery, DiscoveryError> {
    let mut found = InstallationDiscovery::default();

    for thing in page_config.thing_map.values() {
        debug!("Found thing: {} ({})", thing.name.as_deref().unwrap_or("-"), thing.id.0);
        let device = page_config
            .device(thing.device_id)
            .ok_or(DiscoveryError::ThingWithoutDevice {
                installation_id,
                thing_id: thing.id,
                device_id: thing.device_id,
            })?;
        found
            .devices
            .entry((thing.device_id, thing.id))
            .or_insert_with(|| DeviceInfo {
                identifier: unique_key(installation_id, thing.device_id, thing.id, None),
                manufacturer: device.tenant_name.clone(),
                model: format!(
                    "{}: {}",
                    device.code.as_deref().unwrap_or_default(),
                    device.model_name.as_deref().unwrap_or_default()
                ),
                name: format!(
                    "{}-{}: {}",
                    thing.model_code.as_deref().unwrap_or_default(),
                    thing.id.0,
                    thing.model_name.as_deref().unwrap_or_default()
                ),
            });
    }

    let mut seen: BTreeSet<(DeviceId, ThingId, String)> = BTreeSet::new();
    for (_, page) in &page_config.page_map {
        found.groups.extend(page.input_group_get_code_list.iter().cloned());
        for tab in &page.tab_list {
            for codes in tab.input_group_get_code_map.values() {
                found.groups.extend(codes.iter().cloned());
            }
            for widget in &tab.widget_list {
                found.groups.extend(widget.input_group_get_code_list.iter().cloned());
                for group in &widget.widget_input_group_list {
                    found.groups.insert(group.input_group_get_code.clone());
                    for input in &group.input_list {
                        if !seen.insert((input.device_id, input.thing_id, input.code.clone())) {
                            continue;
                        }
                        let device = found.devices.get(&(input.device_id, input.thing_id)).ok_or_else(|| {
                            DiscoveryError::UnregisteredThing {
                                installation_id,
                                device_id: input.device_id,
                                thing_id: input.thing_id,
                                code: input.code.clone(),
                            }
                        })?;
                        debug!(
                            "Found: {} - {} @ D{}/T{}",
                            input.code,
                            input.name.as_deref().unwrap_or("-"),
                            input.device_id.0,
                            input.thing_id.0
                        );
                        let key = unique_key(installation_id, input.device_id, input.thing_id, Some(&input.code));
                        let thing_model_id = page_config.thing(input.thing_id).and_then(|t| t.model_id);
                        let normalized =
                            NormalizedInput::new(key.clone(), installation_id, thing_model_id, device.clone(), input, tables)
                                .map_err(|source| DiscoveryError::Classification {
                                    installation_id,
                                    key,
                                    source,
                                })?;
                        found.inputs.push(normalized);
                    }
                }
            }
        }
    }

    debug!(
        "Groups: {}",
        found.groups.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
    );
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entity::{DeviceClass, StateClass};
    use crate::models::febos::{Input, Page, Thing};
    use crate::testing::{FIXTURE_INSTALLATION, FakeApi, fixture_page_config};

    fn fixture() -> InstallationDiscovery {
        discover_installation(FIXTURE_INSTALLATION, &fixture_page_config(), ResolverTables::builtin())
            .expect("fixture discovers")
    }

    fn inputs_mut(page: &mut Page) -> impl Iterator<Item = &mut Input> {
        page.tab_list
            .iter_mut()
            .flat_map(|tab| tab.widget_list.iter_mut())
            .flat_map(|widget| widget.widget_input_group_list.iter_mut())
            .flat_map(|group| group.input_list.iter_mut())
    }

    #[test]
    fn collects_groups_from_every_level() {
        let found = fixture();
        let groups: Vec<&str> = found.groups.iter().map(String::as_str).collect();
        assert_eq!(groups, ["G_ENERGY", "G_HOME", "G_POWER", "G_SETTINGS", "G_STATUS"]);
    }

    #[test]
    fn repeated_triple_yields_one_input() {
        let found = fixture();
        let r8100: Vec<_> = found.inputs.iter().filter(|i| i.code() == "R8100").collect();
        assert_eq!(r8100.len(), 1);
        // the later G_STATUS copy is named "Tensione rete" and carries bounds
        let descriptor = r8100[0].descriptor();
        assert_eq!(descriptor.label, "R8100: Tensione TAE1");
        assert_eq!(descriptor.min, None);
        assert_eq!(descriptor.max, None);
        assert_eq!(found.inputs.len(), 9);
    }

    #[test]
    fn first_listed_page_owns_shared_inputs() {
        let mut cfg = fixture_page_config();
        let (_, original) = cfg.page_map.remove(0);
        let mut renamed = original.clone();
        for input in inputs_mut(&mut renamed) {
            input.name = Some("Pagina due".into());
        }
        // "2" sorts after "10" but is listed first
        cfg.page_map = vec![("2".into(), renamed), ("10".into(), original)];

        let found = discover_installation(FIXTURE_INSTALLATION, &cfg, ResolverTables::builtin()).unwrap();
        assert_eq!(found.inputs.len(), 9);
        assert!(found.inputs.iter().all(|i| i.label().ends_with(": Pagina due")));
    }

    #[test]
    fn builds_device_records() {
        let found = fixture();
        let info = &found.devices[&(DeviceId(1001), ThingId(2001))];
        assert_eq!(info.identifier, "febos_1_1001_2001");
        assert_eq!(info.manufacturer.as_deref(), Some("EmmeTI"));
        assert_eq!(info.model, "FBS-01: Febos Crono");
        assert_eq!(info.name, "TRM-2001: Termoregolazione");
    }

    #[test]
    fn classifies_fixture_inputs() {
        let found = fixture();
        let by_code = |code: &str| found.inputs.iter().find(|i| i.code() == code).expect(code);

        assert_eq!(by_code("R9052").kind(), EntityKind::Number);
        assert_eq!(by_code("R8967").kind(), EntityKind::Switch);
        assert_eq!(by_code("R8672").kind(), EntityKind::BinarySensor);
        assert_eq!(by_code("R8672").device_class(), Some(DeviceClass::Window));
        // parameter on the read-only thing model
        assert_eq!(by_code("R8660").kind(), EntityKind::Sensor);
        assert_eq!(by_code("R8660").device_class(), Some(DeviceClass::Humidity));
        assert_eq!(by_code("R8765").state_class(), Some(StateClass::Total));
        assert_eq!(by_code("R8002").unit(), "kW");
    }

    #[test]
    fn thing_without_device_fails_installation() {
        let mut cfg = fixture_page_config();
        cfg.thing_map.insert(
            "2999".into(),
            Thing {
                id: ThingId(2999),
                device_id: DeviceId(4242),
                ..Thing::default()
            },
        );
        let err = discover_installation(FIXTURE_INSTALLATION, &cfg, ResolverTables::builtin()).unwrap_err();
        assert!(matches!(
            err,
            DiscoveryError::ThingWithoutDevice {
                device_id: DeviceId(4242),
                ..
            }
        ));
    }

    #[test]
    fn input_on_unregistered_thing_fails_installation() {
        let mut cfg = fixture_page_config();
        cfg.thing_map.remove("2002");
        let err = discover_installation(FIXTURE_INSTALLATION, &cfg, ResolverTables::builtin()).unwrap_err();
        match err {
            DiscoveryError::UnregisteredThing { thing_id, code, .. } => {
                assert_eq!(thing_id, ThingId(2002));
                assert_eq!(code, "R8660");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unclassifiable_input_fails_installation() {
        let mut tables = ResolverTables::builtin().clone();
        tables.unit_overrides.insert("R8765", "furlong");
        let err = discover_installation(FIXTURE_INSTALLATION, &fixture_page_config(), &tables).unwrap_err();
        assert!(matches!(err, DiscoveryError::Classification { .. }));
    }

    #[test]
    fn unknown_vendor_unit_fails_installation() {
        let mut cfg = fixture_page_config();
        let page = &mut cfg.page_map[0].1;
        let mut pressure = inputs_mut(page).next().expect("fixture input").clone();
        pressure.code = "R7001".into();
        pressure.name = Some("Pressione circuito".into());
        pressure.meas_unit = Some("bar".into());
        page.tab_list[0].widget_list[0].widget_input_group_list[0].input_list.push(pressure);

        let err = discover_installation(FIXTURE_INSTALLATION, &cfg, ResolverTables::builtin()).unwrap_err();
        match err {
            DiscoveryError::Classification { key, source, .. } => {
                assert_eq!(key, "febos_1_1001_2001_R7001");
                assert_eq!(
                    source,
                    ClassificationError::UnmappedUnit {
                        code: "R7001".into(),
                        unit: "bar".into()
                    }
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn failed_installation_contributes_nothing() {
        let mut api = FakeApi::with_fixture();
        let mut broken = fixture_page_config();
        broken.thing_map.remove("2002");
        api.page_configs.insert(InstallationId(2), broken);

        let table = discover(&api, &[FIXTURE_INSTALLATION, InstallationId(2)], ResolverTables::builtin()).unwrap();
        assert_eq!(table.len(), 9);
        assert!(table.iter().all(|i| i.identity.installation_id == FIXTURE_INSTALLATION));
        assert_eq!(table.failed.len(), 1);
        assert_eq!(table.failed[0].0, InstallationId(2));
        assert!(!table.groups.contains_key(&InstallationId(2)));
    }

    #[test]
    fn transport_failure_aborts_discovery() {
        let api = FakeApi::with_fixture();
        let err = discover(&api, &[FIXTURE_INSTALLATION, InstallationId(9)], ResolverTables::builtin()).unwrap_err();
        assert!(matches!(err, DiscoveryError::Api(_)));
    }

    #[test]
    fn keys_resolve_to_inputs() {
        let api = FakeApi::with_fixture();
        let table = discover(&api, &[FIXTURE_INSTALLATION], ResolverTables::builtin()).unwrap();
        let input = table.by_key("febos_1_1001_2001_R9052").expect("known key");
        assert_eq!(input.code(), "R9052");
        assert_eq!(table.descriptors(Some(EntityKind::Switch)).len(), 1);
        assert_eq!(table.descriptors(None).len(), 9);
        // integer default seeds the projection
        assert_eq!(table.projection()["febos_1_1001_2001_R9052"], Some(StateValue::Float(35.0)));
        assert_eq!(table.projection()["febos_1_1001_2001_R8100"], None);
    }
}
