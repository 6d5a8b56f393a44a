//! Materials and their natures.

use crate::identifiers::{Id, Identified};

/// Hardening rule of a bilinear elasto-plastic nature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardeningRule {
    Isotropic,
    Kinematic,
    Combined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldFunction {
    VonMises,
    Tresca,
}

/// One physical behaviour of a material. A material carries at most one
/// nature of each kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Nature {
    Elastic {
        e: f64,
        nu: f64,
        /// Shear modulus; derived from E and nu when absent.
        g: Option<f64>,
        rho: f64,
        /// Thermal expansion coefficient.
        alpha: f64,
        t_ref: f64,
        /// Structural damping coefficient.
        ge: f64,
    },
    BilinearElastic {
        elastic_limit: f64,
        secondary_slope: f64,
        hardening: HardeningRule,
        yield_function: YieldFunction,
    },
    NonLinearElastic {
        /// Stress-strain function table.
        table: Id,
    },
    /// Synthetic nature carried by cellified rigid links.
    Rigid {
        /// Penalty stiffness; `None` in the Lagrangian form.
        rigidity: Option<f64>,
        lagrangian: bool,
    },
    /// Synthetic nature carried by cellified RBE3 participations.
    Interpolation {
        master_dofs: crate::dofs::DOFS,
        slave_dofs: crate::dofs::DOFS,
        coefficient: f64,
    },
}

impl Nature {
    pub fn kind_label(&self) -> &'static str {
        match self {
            Nature::Elastic { .. } => "elastic",
            Nature::BilinearElastic { .. } => "bilinear-elastic",
            Nature::NonLinearElastic { .. } => "nonlinear-elastic",
            Nature::Rigid { .. } => "rigid",
            Nature::Interpolation { .. } => "interpolation",
        }
    }
}

/// A material: identity plus a list of natures, bound to cells through
/// [`CellContainer`] assignments owned by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub id: Id,
    pub original_id: Option<Id>,
    pub name: Option<String>,
    natures: Vec<Nature>,
}

impl Material {
    pub fn new(id: Id, original_id: Option<Id>, name: Option<String>) -> Self {
        Material {
            id,
            original_id,
            name,
            natures: Vec::new(),
        }
    }

    /// Add a nature, replacing any previous one of the same kind.
    pub fn add_nature(&mut self, nature: Nature) {
        if let Some(pos) = self
            .natures
            .iter()
            .position(|n| n.kind_label() == nature.kind_label())
        {
            self.natures[pos] = nature;
        } else {
            self.natures.push(nature);
        }
    }

    pub fn natures(&self) -> &[Nature] {
        &self.natures
    }

    pub fn elastic(&self) -> Option<&Nature> {
        self.natures
            .iter()
            .find(|n| matches!(n, Nature::Elastic { .. }))
    }

    /// Shear modulus of the elastic nature, derived from E and nu if absent.
    pub fn shear_modulus(&self) -> Option<f64> {
        match self.elastic() {
            Some(Nature::Elastic { e, nu, g, .. }) => {
                Some(g.unwrap_or(e / (2.0 * (1.0 + nu))))
            }
            _ => None,
        }
    }
}

impl Identified for Material {
    fn id(&self) -> Id {
        self.id
    }

    fn original_id(&self) -> Option<Id> {
        self.original_id
    }
}

/// A union of cell groups and explicit cell ids, used to bind materials and
/// element loadings to parts of the mesh.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CellContainer {
    group_names: Vec<String>,
    cell_ids: Vec<Id>,
}

impl CellContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_group(name: &str) -> Self {
        let mut container = Self::new();
        container.add_group(name);
        container
    }

    pub fn from_cells(cell_ids: Vec<Id>) -> Self {
        CellContainer {
            group_names: Vec::new(),
            cell_ids,
        }
    }

    pub fn add_group(&mut self, name: &str) {
        if !self.group_names.iter().any(|g| g == name) {
            self.group_names.push(name.to_string());
        }
    }

    pub fn add_cell(&mut self, cell_id: Id) {
        if !self.cell_ids.contains(&cell_id) {
            self.cell_ids.push(cell_id);
        }
    }

    pub fn group_names(&self) -> &[String] {
        &self.group_names
    }

    pub fn cell_ids(&self) -> &[Id] {
        &self.cell_ids
    }

    pub fn is_empty(&self) -> bool {
        self.group_names.is_empty() && self.cell_ids.is_empty()
    }
}

/// Binds a material to the cells of a container.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialAssignment {
    pub material: Id,
    pub container: CellContainer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_nature_replaces_same_kind() {
        let mut material = Material::new(1, Some(7), Some("STEEL".to_string()));
        material.add_nature(Nature::Elastic {
            e: 210e9,
            nu: 0.3,
            g: None,
            rho: 7800.0,
            alpha: 0.0,
            t_ref: 20.0,
            ge: 0.0,
        });
        material.add_nature(Nature::Elastic {
            e: 70e9,
            nu: 0.33,
            g: None,
            rho: 2700.0,
            alpha: 0.0,
            t_ref: 20.0,
            ge: 0.0,
        });
        assert_eq!(material.natures().len(), 1);
        match material.elastic().expect("elastic nature") {
            Nature::Elastic { e, .. } => assert_eq!(*e, 70e9),
            _ => unreachable!(),
        }
    }

    #[test]
    fn shear_modulus_is_derived_when_absent() {
        let mut material = Material::new(1, None, None);
        material.add_nature(Nature::Elastic {
            e: 200.0,
            nu: 0.25,
            g: None,
            rho: 0.0,
            alpha: 0.0,
            t_ref: 0.0,
            ge: 0.0,
        });
        let g = material.shear_modulus().expect("derived G");
        assert!((g - 80.0).abs() < 1e-12);
    }

    #[test]
    fn cell_container_deduplicates() {
        let mut container = CellContainer::new();
        container.add_group("PROP_1");
        container.add_group("PROP_1");
        container.add_cell(4);
        container.add_cell(4);
        assert_eq!(container.group_names().len(), 1);
        assert_eq!(container.cell_ids(), &[4]);
        assert!(!container.is_empty());
    }
}
