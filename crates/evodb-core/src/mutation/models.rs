use crate::{
    error::{EvolutionError, SimulationError, SimulationFailure},
    mutation::{
        SchemaMutation, SimulationContext,
        hint::{serialize_attr, serialize_value},
        model_is_mutable,
    },
    mutator::ModelMutator,
    sig::{AttrValue, IndexSignature, ProjectSignature, Together},
    state::default_table_name,
};

///
/// RenameModel
///

#[derive(Clone, Debug)]
pub struct RenameModel {
    pub old_model_name: String,
    pub new_model_name: String,
    pub db_table: Option<String>,
}

impl RenameModel {
    #[must_use]
    pub fn new(
        old_model_name: impl Into<String>,
        new_model_name: impl Into<String>,
        db_table: impl Into<String>,
    ) -> Self {
        Self {
            old_model_name: old_model_name.into(),
            new_model_name: new_model_name.into(),
            db_table: Some(db_table.into()),
        }
    }

    pub(crate) fn mutate(&self, mutator: &mut ModelMutator<'_>) -> Result<(), EvolutionError> {
        let old_table = mutator.table_name();
        let new_table = self.db_table.clone().unwrap_or_else(|| {
            default_table_name(mutator.app_label(), &self.new_model_name)
        });

        let sql = mutator.backend().rename_table_sql(&old_table, &new_table);
        mutator.add_sql(sql);

        Ok(())
    }
}

impl SchemaMutation for RenameModel {
    fn hint_name(&self) -> &'static str {
        "RenameModel"
    }

    fn hint_params(&self) -> Vec<String> {
        let mut params = vec![
            serialize_value(&self.old_model_name),
            serialize_value(&self.new_model_name),
        ];

        if let Some(db_table) = &self.db_table {
            params.push(serialize_attr(
                "db_table",
                &AttrValue::from(db_table.as_str()),
            ));
        }

        params
    }

    fn simulate(
        &self,
        ctx: &SimulationContext<'_>,
        project_sig: &mut ProjectSignature,
    ) -> Result<(), SimulationError> {
        let action = "rename the model".to_string();

        let app_sig = project_sig.get_app_sig_mut(ctx.app_label).ok_or_else(|| {
            SimulationFailure::missing_app(action.as_str(), ctx.app_label, &self.old_model_name)
        })?;

        {
            let model_sig = app_sig
                .get_model_sig_mut(&self.old_model_name)
                .ok_or_else(|| {
                    SimulationFailure::missing_model(action.as_str(), ctx.app_label, &self.old_model_name)
                })?;

            // An absent table name resets to the default generated name.
            model_sig.table_name = self.db_table.clone().unwrap_or_else(|| {
                default_table_name(ctx.app_label, &self.new_model_name)
            });
        }

        app_sig
            .rename_model_sig(&self.old_model_name, &self.new_model_name)
            .map_err(|_| {
                SimulationFailure::missing_model(action.as_str(), ctx.app_label, &self.old_model_name)
            })?;

        // Retarget every relation in the project that pointed at the old
        // model name.
        let old_related_model = format!("{}.{}", ctx.app_label, self.old_model_name);
        let new_related_model = format!("{}.{}", ctx.app_label, self.new_model_name);

        for app_sig in project_sig.app_sigs_mut() {
            for model_sig in app_sig.model_sigs_mut() {
                for field_sig in model_sig.field_sigs_mut() {
                    if field_sig.related_model.as_deref() == Some(old_related_model.as_str()) {
                        field_sig.related_model = Some(new_related_model.clone());
                    }
                }
            }
        }

        Ok(())
    }

    fn is_mutable(&self, ctx: &SimulationContext<'_>, _project_sig: &ProjectSignature) -> bool {
        model_is_mutable(ctx, ctx.app_label, &self.old_model_name)
    }
}

///
/// DeleteModel
///

#[derive(Clone, Debug)]
pub struct DeleteModel {
    pub model_name: String,
}

impl DeleteModel {
    #[must_use]
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
        }
    }

    pub(crate) fn mutate(&self, mutator: &mut ModelMutator<'_>) -> Result<(), EvolutionError> {
        let table_name = mutator.table_name();
        let mut sql = Vec::new();

        // Join tables fall first, then the model's own table.
        for field_sig in mutator.model_sig().field_sigs() {
            if field_sig.field_type.is_many_to_many() {
                let m2m_table = field_sig.m2m_table_name(&table_name);
                sql.extend(mutator.backend().delete_table_sql(&m2m_table));
            }
        }

        sql.extend(mutator.backend().delete_table_sql(&table_name));
        mutator.add_sql(sql);

        Ok(())
    }
}

impl SchemaMutation for DeleteModel {
    fn hint_name(&self) -> &'static str {
        "DeleteModel"
    }

    fn hint_params(&self) -> Vec<String> {
        vec![serialize_value(&self.model_name)]
    }

    fn simulate(
        &self,
        ctx: &SimulationContext<'_>,
        project_sig: &mut ProjectSignature,
    ) -> Result<(), SimulationError> {
        let action = "delete the model".to_string();

        let app_sig = project_sig.get_app_sig_mut(ctx.app_label).ok_or_else(|| {
            SimulationFailure::missing_app(action.as_str(), ctx.app_label, &self.model_name)
        })?;

        app_sig.remove_model_sig(&self.model_name).map_err(|_| {
            SimulationFailure::missing_model(action.as_str(), ctx.app_label, &self.model_name)
        })?;

        Ok(())
    }

    fn is_mutable(&self, ctx: &SimulationContext<'_>, _project_sig: &ProjectSignature) -> bool {
        model_is_mutable(ctx, ctx.app_label, &self.model_name)
    }
}

///
/// DeleteApplication
///

#[derive(Clone, Debug, Default)]
pub struct DeleteApplication;

impl DeleteApplication {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SchemaMutation for DeleteApplication {
    fn hint_name(&self) -> &'static str {
        "DeleteApplication"
    }

    fn hint_params(&self) -> Vec<String> {
        Vec::new()
    }

    fn simulate(
        &self,
        ctx: &SimulationContext<'_>,
        project_sig: &mut ProjectSignature,
    ) -> Result<(), SimulationError> {
        // Without a bound database there is nothing to route deletions to.
        if ctx.database.is_none() {
            return Ok(());
        }

        // An application that is already gone is a no-op, not a failure.
        let Some(app_sig) = project_sig.get_app_sig(ctx.app_label) else {
            return Ok(());
        };

        let model_names: Vec<String> = app_sig.model_names().map(str::to_string).collect();

        for model_name in model_names {
            let mutation = DeleteModel::new(&model_name);

            if mutation.is_mutable(ctx, project_sig) {
                mutation.simulate(ctx, project_sig)?;
            }
        }

        Ok(())
    }

    fn is_mutable(&self, _ctx: &SimulationContext<'_>, _project_sig: &ProjectSignature) -> bool {
        true
    }
}

///
/// MetaValue
///
/// The new value carried by a `ChangeMeta` mutation.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MetaValue {
    Together(Together),
    Indexes(Vec<IndexSignature>),
}

impl MetaValue {
    /// Canonical hint rendering: groups as tuple lists, indexes as dicts
    /// with sorted keys.
    #[must_use]
    pub fn hint_form(&self) -> String {
        match self {
            Self::Together(together) => {
                let groups: Vec<String> = together
                    .groups()
                    .iter()
                    .map(|group| {
                        let names: Vec<String> =
                            group.iter().map(|name| format!("'{name}'")).collect();

                        format!("({})", names.join(", "))
                    })
                    .collect();

                format!("[{}]", groups.join(", "))
            }
            Self::Indexes(index_sigs) => {
                let entries: Vec<String> = index_sigs
                    .iter()
                    .map(|index_sig| {
                        let fields: Vec<String> = index_sig
                            .fields
                            .iter()
                            .map(|name| format!("'{name}'"))
                            .collect();

                        match &index_sig.name {
                            Some(name) if !name.is_empty() => format!(
                                "{{'fields': [{}], 'name': '{name}'}}",
                                fields.join(", ")
                            ),
                            _ => format!("{{'fields': [{}]}}", fields.join(", ")),
                        }
                    })
                    .collect();

                format!("[{}]", entries.join(", "))
            }
        }
    }
}

///
/// ChangeMeta
///

#[derive(Clone, Debug)]
pub struct ChangeMeta {
    pub model_name: String,
    pub prop_name: String,
    pub new_value: MetaValue,
}

impl ChangeMeta {
    #[must_use]
    pub fn new(
        model_name: impl Into<String>,
        prop_name: impl Into<String>,
        new_value: MetaValue,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            prop_name: prop_name.into(),
            new_value,
        }
    }

    pub(crate) fn mutate(&self, mutator: &mut ModelMutator<'_>) -> Result<(), EvolutionError> {
        let model_sig = mutator.model_sig();

        let old_value = match self.prop_name.as_str() {
            "unique_together" => MetaValue::Together(model_sig.unique_together().clone()),
            "index_together" => MetaValue::Together(model_sig.index_together().clone()),
            "indexes" => MetaValue::Indexes(model_sig.index_sigs.clone()),
            _ => {
                return Err(EvolutionError::NotImplemented(format!(
                    "ChangeMeta does not support modifying the '{}' attribute on '{}'",
                    self.prop_name, self.model_name
                )));
            }
        };

        mutator.change_meta(&self.prop_name, old_value, self.new_value.clone());

        Ok(())
    }
}

impl SchemaMutation for ChangeMeta {
    fn hint_name(&self) -> &'static str {
        "ChangeMeta"
    }

    fn hint_params(&self) -> Vec<String> {
        vec![
            serialize_value(&self.model_name),
            serialize_value(&self.prop_name),
            self.new_value.hint_form(),
        ]
    }

    fn simulate(
        &self,
        ctx: &SimulationContext<'_>,
        project_sig: &mut ProjectSignature,
    ) -> Result<(), SimulationError> {
        let action = "change a meta property".to_string();

        let app_sig = project_sig.get_app_sig_mut(ctx.app_label).ok_or_else(|| {
            SimulationFailure::missing_app(action.as_str(), ctx.app_label, &self.model_name)
        })?;

        let model_sig = app_sig.get_model_sig_mut(&self.model_name).ok_or_else(|| {
            SimulationFailure::missing_model(action.as_str(), ctx.app_label, &self.model_name)
        })?;

        if !ctx
            .backend
            .supported_change_meta()
            .contains(&self.prop_name.as_str())
        {
            return Err(SimulationFailure::UnsupportedMetaProp {
                model_name: self.model_name.clone(),
                prop_name: self.prop_name.clone(),
            }
            .into());
        }

        match (&self.prop_name[..], &self.new_value) {
            ("unique_together", MetaValue::Together(together)) => {
                model_sig.set_unique_together(together.clone());
                model_sig.record_unique_together_applied();
            }
            ("index_together", MetaValue::Together(together)) => {
                model_sig.set_index_together(together.clone());
            }
            ("indexes", MetaValue::Indexes(index_sigs)) => {
                model_sig.index_sigs = index_sigs.clone();
            }
            _ => {
                return Err(SimulationFailure::UnsupportedMetaProp {
                    model_name: self.model_name.clone(),
                    prop_name: self.prop_name.clone(),
                }
                .into());
            }
        }

        Ok(())
    }

    fn is_mutable(&self, ctx: &SimulationContext<'_>, _project_sig: &ProjectSignature) -> bool {
        model_is_mutable(ctx, ctx.app_label, &self.model_name)
    }
}
