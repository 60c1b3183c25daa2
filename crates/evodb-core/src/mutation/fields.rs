use crate::{
    error::{EvolutionError, SimulationError, SimulationFailure},
    mutation::{
        InitialValue, SchemaMutation, SimulationContext,
        hint::{serialize_attr, serialize_value},
        model_is_mutable,
    },
    mutator::{AttrChange, ModelMutator},
    sig::{AttrList, AttrValue, FieldSignature, FieldType, ProjectSignature},
};

///
/// AddField
///

#[derive(Clone, Debug)]
pub struct AddField {
    pub model_name: String,
    pub field_name: String,
    pub field_type: FieldType,
    pub initial: Option<InitialValue>,
    pub field_attrs: AttrList,
    pub related_model: Option<String>,
}

impl AddField {
    #[must_use]
    pub fn new(
        model_name: impl Into<String>,
        field_name: impl Into<String>,
        field_type: FieldType,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            field_name: field_name.into(),
            field_type,
            initial: None,
            field_attrs: AttrList::new(),
            related_model: None,
        }
    }

    #[must_use]
    pub fn with_attr(mut self, attr_name: &str, value: impl Into<AttrValue>) -> Self {
        self.field_attrs.set(attr_name, value.into());
        self
    }

    #[must_use]
    pub fn with_initial(mut self, initial: impl Into<InitialValue>) -> Self {
        self.initial = Some(initial.into());
        self
    }

    #[must_use]
    pub fn with_related_model(mut self, related_model: impl Into<String>) -> Self {
        self.related_model = Some(related_model.into());
        self
    }

    /// Build the mutation that would add an existing field signature, used
    /// when hinting from a diff. Non-nullable columns get a placeholder
    /// initial value the author must fill in.
    #[must_use]
    pub fn from_field_sig(model_name: &str, field_sig: &FieldSignature) -> Self {
        let mut mutation = Self::new(model_name, &field_sig.field_name, field_sig.field_type);

        mutation.field_attrs = field_sig
            .explicit_attrs()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        mutation.related_model = field_sig.related_model.clone();

        if !field_sig.is_nullable() && !field_sig.field_type.is_many_to_many() {
            mutation.initial = Some(InitialValue::Placeholder);
        }

        mutation
    }

    /// The field signature this mutation produces.
    #[must_use]
    pub fn to_field_sig(&self) -> FieldSignature {
        let mut field_sig = FieldSignature::new(&self.field_name, self.field_type);

        for (name, value) in self.field_attrs.iter() {
            field_sig.set_attr(name, value.clone());
        }

        if let Some(related_model) = &self.related_model {
            field_sig = field_sig.with_related_model(related_model.clone());
        }

        field_sig
    }

    fn is_nullable(&self) -> bool {
        self.field_attrs
            .get("null")
            .map_or(false, AttrValue::is_truthy)
    }

    pub(crate) fn mutate(&self, mutator: &mut ModelMutator<'_>) -> Result<(), EvolutionError> {
        let field_sig = self.to_field_sig();

        if self.field_type.is_many_to_many() {
            mutator.add_m2m_table(&field_sig)
        } else {
            mutator.add_column(field_sig, self.initial.clone());
            Ok(())
        }
    }
}

impl SchemaMutation for AddField {
    fn hint_name(&self) -> &'static str {
        "AddField"
    }

    fn hint_params(&self) -> Vec<String> {
        let mut params = vec![
            serialize_value(&self.model_name),
            serialize_value(&self.field_name),
            serialize_value(&self.field_type.to_string()),
        ];

        if let Some(initial) = &self.initial {
            params.push(format!("initial={}", initial.hint_form()));
        }

        params.extend(
            self.field_attrs
                .iter()
                .map(|(name, value)| serialize_attr(name, value)),
        );

        if let Some(related_model) = &self.related_model {
            params.push(serialize_attr(
                "related_model",
                &AttrValue::from(related_model.as_str()),
            ));
        }

        params
    }

    fn simulate(
        &self,
        ctx: &SimulationContext<'_>,
        project_sig: &mut ProjectSignature,
    ) -> Result<(), SimulationError> {
        let action = format!("add the field \"{}\"", self.field_name);

        let app_sig = project_sig.get_app_sig_mut(ctx.app_label).ok_or_else(|| {
            SimulationFailure::missing_app(action.as_str(), ctx.app_label, &self.model_name)
        })?;

        let model_sig = app_sig.get_model_sig_mut(&self.model_name).ok_or_else(|| {
            SimulationFailure::missing_model(action.as_str(), ctx.app_label, &self.model_name)
        })?;

        if model_sig.get_field_sig(&self.field_name).is_some() {
            return Err(SimulationFailure::FieldAlreadyExists {
                app_label: ctx.app_label.to_string(),
                model_name: self.model_name.clone(),
                field_name: self.field_name.clone(),
            }
            .into());
        }

        if !self.field_type.is_many_to_many() && !self.is_nullable() && self.initial.is_none() {
            return Err(SimulationFailure::InitialValueRequired {
                app_label: ctx.app_label.to_string(),
                model_name: self.model_name.clone(),
                field_name: self.field_name.clone(),
            }
            .into());
        }

        model_sig.add_field_sig(self.to_field_sig());

        Ok(())
    }

    fn is_mutable(&self, ctx: &SimulationContext<'_>, _project_sig: &ProjectSignature) -> bool {
        model_is_mutable(ctx, ctx.app_label, &self.model_name)
    }
}

///
/// DeleteField
///

#[derive(Clone, Debug)]
pub struct DeleteField {
    pub model_name: String,
    pub field_name: String,
}

impl DeleteField {
    #[must_use]
    pub fn new(model_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            field_name: field_name.into(),
        }
    }

    pub(crate) fn mutate(&self, mutator: &mut ModelMutator<'_>) -> Result<(), EvolutionError> {
        let field_sig = mutator
            .model_sig()
            .get_field_sig_required(&self.field_name)?
            .clone();

        if field_sig.field_type.is_many_to_many() {
            let m2m_table = field_sig.m2m_table_name(&mutator.table_name());
            let sql = mutator.backend().delete_table_sql(&m2m_table);
            mutator.add_sql(sql);

            Ok(())
        } else {
            mutator.delete_column(field_sig);

            Ok(())
        }
    }
}

impl SchemaMutation for DeleteField {
    fn hint_name(&self) -> &'static str {
        "DeleteField"
    }

    fn hint_params(&self) -> Vec<String> {
        vec![
            serialize_value(&self.model_name),
            serialize_value(&self.field_name),
        ]
    }

    fn simulate(
        &self,
        ctx: &SimulationContext<'_>,
        project_sig: &mut ProjectSignature,
    ) -> Result<(), SimulationError> {
        let action = format!("delete the field \"{}\"", self.field_name);

        let app_sig = project_sig.get_app_sig_mut(ctx.app_label).ok_or_else(|| {
            SimulationFailure::missing_app(action.as_str(), ctx.app_label, &self.model_name)
        })?;

        let model_sig = app_sig.get_model_sig_mut(&self.model_name).ok_or_else(|| {
            SimulationFailure::missing_model(action.as_str(), ctx.app_label, &self.model_name)
        })?;

        let field_sig = model_sig.get_field_sig(&self.field_name).ok_or_else(|| {
            SimulationFailure::missing_field(action.as_str(), ctx.app_label, &self.model_name)
        })?;

        if field_sig.is_primary_key() {
            return Err(SimulationFailure::PrimaryKeyDeletion {
                app_label: ctx.app_label.to_string(),
                model_name: self.model_name.clone(),
                field_name: self.field_name.clone(),
            }
            .into());
        }

        // Uniqueness groups referencing the field are updated before the
        // deletion itself lands.
        model_sig.strip_field_from_unique_together(&self.field_name);

        model_sig
            .remove_field_sig(&self.field_name)
            .map_err(|_| SimulationFailure::missing_field(action.as_str(), ctx.app_label, &self.model_name))?;

        Ok(())
    }

    fn is_mutable(&self, ctx: &SimulationContext<'_>, _project_sig: &ProjectSignature) -> bool {
        model_is_mutable(ctx, ctx.app_label, &self.model_name)
    }
}

///
/// RenameField
///

#[derive(Clone, Debug)]
pub struct RenameField {
    pub model_name: String,
    pub old_field_name: String,
    pub new_field_name: String,
    pub db_column: Option<String>,
    pub db_table: Option<String>,
}

impl RenameField {
    #[must_use]
    pub fn new(
        model_name: impl Into<String>,
        old_field_name: impl Into<String>,
        new_field_name: impl Into<String>,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            old_field_name: old_field_name.into(),
            new_field_name: new_field_name.into(),
            db_column: None,
            db_table: None,
        }
    }

    #[must_use]
    pub fn with_db_column(mut self, db_column: impl Into<String>) -> Self {
        self.db_column = Some(db_column.into());
        self
    }

    #[must_use]
    pub fn with_db_table(mut self, db_table: impl Into<String>) -> Self {
        self.db_table = Some(db_table.into());
        self
    }

    /// Apply the explicit column/table overrides to a field signature,
    /// clearing stale values when no override is given.
    fn apply_overrides(&self, field_sig: &mut FieldSignature) {
        if field_sig.field_type.is_many_to_many() {
            match &self.db_table {
                Some(db_table) => {
                    field_sig.set_attr("db_table", AttrValue::from(db_table.as_str()));
                }
                None => {
                    field_sig.clear_attr("db_table");
                }
            }
        } else if let Some(db_column) = &self.db_column {
            field_sig.set_attr("db_column", AttrValue::from(db_column.as_str()));
        } else {
            // Resetting to the default generated column name.
            field_sig.clear_attr("db_column");
        }
    }

    pub(crate) fn mutate(&self, mutator: &mut ModelMutator<'_>) -> Result<(), EvolutionError> {
        let old_field_sig = mutator
            .model_sig()
            .get_field_sig_required(&self.old_field_name)?
            .clone();

        let mut new_field_sig = old_field_sig.clone();
        new_field_sig.field_name = self.new_field_name.clone();
        self.apply_overrides(&mut new_field_sig);

        let table_name = mutator.table_name();

        let sql = if old_field_sig.field_type.is_many_to_many() {
            let old_m2m_table = old_field_sig.m2m_table_name(&table_name);
            let new_m2m_table = new_field_sig.m2m_table_name(&table_name);

            mutator
                .backend()
                .rename_table_sql(&old_m2m_table, &new_m2m_table)
        } else {
            mutator
                .backend()
                .rename_column_sql(mutator.table_model(), &old_field_sig, &new_field_sig)
        };

        mutator.add_sql(sql);

        Ok(())
    }
}

impl SchemaMutation for RenameField {
    fn hint_name(&self) -> &'static str {
        "RenameField"
    }

    fn hint_params(&self) -> Vec<String> {
        let mut params = vec![
            serialize_value(&self.model_name),
            serialize_value(&self.old_field_name),
            serialize_value(&self.new_field_name),
        ];

        if let Some(db_column) = &self.db_column {
            params.push(serialize_attr(
                "db_column",
                &AttrValue::from(db_column.as_str()),
            ));
        }

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
        let action = format!("rename the field \"{}\"", self.old_field_name);

        let app_sig = project_sig.get_app_sig_mut(ctx.app_label).ok_or_else(|| {
            SimulationFailure::missing_app(action.as_str(), ctx.app_label, &self.model_name)
        })?;

        let model_sig = app_sig.get_model_sig_mut(&self.model_name).ok_or_else(|| {
            SimulationFailure::missing_model(action.as_str(), ctx.app_label, &self.model_name)
        })?;

        let mut field_sig = model_sig
            .remove_field_sig(&self.old_field_name)
            .map_err(|_| {
                SimulationFailure::missing_field(action.as_str(), ctx.app_label, &self.model_name)
            })?;

        self.apply_overrides(&mut field_sig);
        field_sig.field_name = self.new_field_name.clone();

        // Uniqueness and index groups keep their arity across the rename.
        model_sig.rename_field_in_together(&self.old_field_name, &self.new_field_name);

        model_sig.add_field_sig(field_sig);

        Ok(())
    }

    fn is_mutable(&self, ctx: &SimulationContext<'_>, _project_sig: &ProjectSignature) -> bool {
        model_is_mutable(ctx, ctx.app_label, &self.model_name)
    }
}

///
/// ChangeField
///

#[derive(Clone, Debug)]
pub struct ChangeField {
    pub model_name: String,
    pub field_name: String,
    pub initial: Option<InitialValue>,
    pub field_attrs: AttrList,
}

impl ChangeField {
    #[must_use]
    pub fn new(model_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            field_name: field_name.into(),
            initial: None,
            field_attrs: AttrList::new(),
        }
    }

    #[must_use]
    pub fn with_attr(mut self, attr_name: &str, value: impl Into<AttrValue>) -> Self {
        self.field_attrs.set(attr_name, value.into());
        self
    }

    #[must_use]
    pub fn with_initial(mut self, initial: impl Into<InitialValue>) -> Self {
        self.initial = Some(initial.into());
        self
    }

    #[must_use]
    pub fn attr(&self, attr_name: &str) -> Option<&AttrValue> {
        self.field_attrs.get(attr_name)
    }

    pub(crate) fn mutate(&self, mutator: &mut ModelMutator<'_>) -> Result<(), EvolutionError> {
        let field_sig = mutator
            .model_sig()
            .get_field_sig_required(&self.field_name)?
            .clone();

        for attr_name in self.field_attrs.names() {
            if !mutator
                .backend()
                .supported_change_attrs()
                .contains(&attr_name)
            {
                return Err(EvolutionError::unsupported_change_attr(
                    attr_name,
                    &self.model_name,
                    &self.field_name,
                ));
            }
        }

        // Only attributes whose value actually changes produce SQL.
        let changes: Vec<AttrChange> = self
            .field_attrs
            .iter()
            .filter_map(|(attr_name, new_value)| {
                let old_value = field_sig.attr_value(attr_name).unwrap_or(AttrValue::Null);

                if old_value == *new_value {
                    None
                } else {
                    Some(AttrChange {
                        attr_name: attr_name.to_string(),
                        old_value,
                        new_value: new_value.clone(),
                    })
                }
            })
            .collect();

        if !changes.is_empty() {
            mutator.change_column(field_sig, changes, self.initial.clone());
        }

        Ok(())
    }
}

impl SchemaMutation for ChangeField {
    fn hint_name(&self) -> &'static str {
        "ChangeField"
    }

    fn hint_params(&self) -> Vec<String> {
        let initial = self
            .initial
            .as_ref()
            .map_or_else(|| "None".to_string(), InitialValue::hint_form);

        let mut params = vec![
            serialize_value(&self.model_name),
            serialize_value(&self.field_name),
            format!("initial={initial}"),
        ];

        params.extend(
            self.field_attrs
                .iter()
                .map(|(name, value)| serialize_attr(name, value)),
        );

        params
    }

    fn simulate(
        &self,
        ctx: &SimulationContext<'_>,
        project_sig: &mut ProjectSignature,
    ) -> Result<(), SimulationError> {
        let action = format!("change the field \"{}\"", self.field_name);

        let app_sig = project_sig.get_app_sig_mut(ctx.app_label).ok_or_else(|| {
            SimulationFailure::missing_app(action.as_str(), ctx.app_label, &self.model_name)
        })?;

        let model_sig = app_sig.get_model_sig_mut(&self.model_name).ok_or_else(|| {
            SimulationFailure::missing_model(action.as_str(), ctx.app_label, &self.model_name)
        })?;

        let field_sig = model_sig
            .get_field_sig_mut(&self.field_name)
            .ok_or_else(|| {
                SimulationFailure::missing_field(action.as_str(), ctx.app_label, &self.model_name)
            })?;

        for (attr_name, value) in self.field_attrs.iter() {
            field_sig.set_attr(attr_name, value.clone());
        }

        let dropping_null = self
            .field_attrs
            .get("null")
            .is_some_and(|null| !null.is_truthy());

        if dropping_null && !field_sig.field_type.is_many_to_many() && self.initial.is_none() {
            return Err(SimulationFailure::InitialValueRequired {
                app_label: ctx.app_label.to_string(),
                model_name: self.model_name.clone(),
                field_name: self.field_name.clone(),
            }
            .into());
        }

        Ok(())
    }

    fn is_mutable(&self, ctx: &SimulationContext<'_>, _project_sig: &ProjectSignature) -> bool {
        model_is_mutable(ctx, ctx.app_label, &self.model_name)
    }
}
