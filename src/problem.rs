use std::error::Error;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use clap::ValueEnum;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::cli::{self, EnergyModel, InstanceArgs};
use crate::config::{DroneConfig, SearchConfig, TruckConfig};
use crate::errors::{ExpectedValue, InvalidInstance};
use crate::routes::{Route, VehicleKind};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Customer {
    pub x: f64,
    pub y: f64,
    pub demand: f64,
    pub dronable: bool,
    pub truck_service_time: f64,
    pub drone_service_time: f64,
}

impl Customer {
    pub fn depot(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            demand: 0.0,
            dronable: true,
            truck_service_time: 0.0,
            drone_service_time: 0.0,
        }
    }
}

/// Read-only instance data, built once before the search starts and passed around by reference.
#[derive(Debug, Serialize)]
pub struct Problem {
    pub name: String,
    pub customers_count: usize,
    pub trucks_count: usize,
    pub drones_count: usize,

    /// Index 0 is the depot.
    pub customers: Vec<Customer>,

    pub truck_distance: cli::DistanceType,
    pub drone_distance: cli::DistanceType,
    #[serde(skip)]
    pub truck_distances: Vec<Vec<f64>>,
    #[serde(skip)]
    pub drone_distances: Vec<Vec<f64>>,

    pub truck: TruckConfig,
    pub drone: DroneConfig,
    pub energy_model: EnergyModel,
    pub speed_type: cli::ConfigType,
    pub range_type: cli::ConfigType,

    pub maximum_waiting_time: f64,
    pub search: SearchConfig,

    pub tabu_size: usize,
    pub reset_after: usize,
    pub diversification_iterations: usize,
}

impl Problem {
    pub fn new(
        name: String,
        customers: Vec<Customer>,
        trucks_count: usize,
        drones_count: usize,
        truck_distance: cli::DistanceType,
        drone_distance: cli::DistanceType,
        truck: TruckConfig,
        drone: DroneConfig,
        energy_model: EnergyModel,
        maximum_waiting_time: f64,
        search: SearchConfig,
    ) -> Result<Self, Box<dyn Error>> {
        if trucks_count + drones_count == 0 {
            return Err(InvalidInstance::NoVehicles.into());
        }

        truck.validate()?;

        let x = customers.iter().map(|c| c.x).collect::<Vec<_>>();
        let y = customers.iter().map(|c| c.y).collect::<Vec<_>>();
        let truck_distances = truck_distance.matrix(&x, &y)?;
        let drone_distances = drone_distance.matrix(&x, &y)?;

        let customers_count = customers.len().saturating_sub(1);
        let base = customers_count as f64 / (trucks_count + drones_count).max(1) as f64;
        let tabu_size = ((search.tabu_size_factor * base) as usize).max(1);
        let reset_after = ((search.reset_after_factor * base) as usize).max(1);
        let diversification_iterations = (search.diversification_factor * base) as usize;

        let (speed_type, range_type) = match &drone {
            DroneConfig::Linear { data, .. } => (data.speed_type, data.range_type),
            DroneConfig::NonLinear { data, .. } => (data.speed_type, data.range_type),
            DroneConfig::Endurance { data } => (data.speed_type, data.range_type),
        };

        let mut problem = Self {
            name,
            customers_count,
            trucks_count,
            drones_count,
            customers,
            truck_distance,
            drone_distance,
            truck_distances,
            drone_distances,
            truck,
            drone,
            energy_model,
            speed_type,
            range_type,
            maximum_waiting_time,
            search,
            tabu_size,
            reset_after,
            diversification_iterations,
        };

        problem.narrow_dronable();
        for customer in 1..=problem.customers_count {
            if problem.trucks_count == 0 && !(problem.drones_count > 0 && problem.customers[customer].dronable) {
                return Err(InvalidInstance::UnservableCustomer(customer).into());
            }
        }

        Ok(problem)
    }

    /// Keep the drone-eligible flag only for customers a drone can serve on a dedicated trip.
    fn narrow_dronable(&mut self) {
        let problem = &*self;
        let servable = (0..=problem.customers_count)
            .map(|customer| {
                customer == 0 || {
                    problem.customers[customer].dronable && {
                        let route = Route::single(problem, VehicleKind::Drone, customer);
                        route.capacity_violation == 0.0
                            && route.energy_violation == 0.0
                            && route.fixed_time_violation == 0.0
                            && route.fixed_distance_violation == 0.0
                    }
                }
            })
            .collect::<Vec<_>>();

        for (customer, servable) in self.customers.iter_mut().zip(servable) {
            customer.dronable = servable;
        }
    }

    /// Load an instance from a problem text file plus the truck and drone JSON configs.
    ///
    /// The problem file holds `trucks_count N`, `drones_count N` and `depot X Y` lines, an optional
    /// `customers_count N` and `drone_model NAME`, then one `X Y DRONABLE DEMAND [TRUCK_ST DRONE_ST]` line
    /// per customer.
    pub fn load(instance: &InstanceArgs, search: SearchConfig) -> Result<Self, Box<dyn Error>> {
        let data = fs::read_to_string(&instance.problem)?;
        let name = ExpectedValue::cast(
            Path::new(&instance.problem)
                .file_stem()
                .and_then(|f| f.to_os_string().into_string().ok()),
        )?;

        let (customers, trucks_count, drones_count, model) = Self::parse(&data)?;
        let trucks_count = instance.trucks_count.unwrap_or(trucks_count);
        let drones_count = instance.drones_count.unwrap_or(drones_count);
        let energy_model = instance.config.or(model).unwrap_or(EnergyModel::Endurance);

        let truck = TruckConfig::load(&instance.truck_cfg)?;
        let drone = DroneConfig::load(&instance.drone_cfg, energy_model, instance.speed_type, instance.range_type)?;

        Self::new(
            name,
            customers,
            trucks_count,
            drones_count,
            instance.truck_distance,
            instance.drone_distance,
            truck,
            drone,
            energy_model,
            instance.waiting_time_limit,
            search,
        )
    }

    fn parse(data: &str) -> Result<(Vec<Customer>, usize, usize, Option<EnergyModel>), Box<dyn Error>> {
        fn _capture<T: FromStr>(regex: &Regex, data: &str) -> Option<T> {
            regex
                .captures(data)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<T>().ok())
        }

        let trucks_count_regex = Regex::new(r"trucks_count (\d+)")?;
        let drones_count_regex = Regex::new(r"drones_count (\d+)")?;
        let customers_count_regex = Regex::new(r"customers_count (\d+)")?;
        let drone_model_regex = Regex::new(r"drone_model ([\w-]+)")?;
        let depot_regex = Regex::new(r"depot (-?[\d\.]+)\s+(-?[\d\.]+)")?;
        let customers_regex = RegexBuilder::new(
            r"^\s*(-?[\d\.]+)\s+(-?[\d\.]+)\s+(0|1)\s+([\d\.]+)(?:\s+([\d\.]+)\s+([\d\.]+))?\s*$",
        )
        .multi_line(true)
        .build()?;

        let trucks_count = _capture::<usize>(&trucks_count_regex, data).ok_or(InvalidInstance::MissingField("trucks count"))?;
        let drones_count = _capture::<usize>(&drones_count_regex, data).ok_or(InvalidInstance::MissingField("drones count"))?;

        let model = match drone_model_regex.captures(data).and_then(|caps| caps.get(1)) {
            Some(m) => Some(
                <EnergyModel as ValueEnum>::from_str(m.as_str(), true)
                    .map_err(|_| InvalidInstance::UnknownDroneModel(m.as_str().to_string()))?,
            ),
            None => None,
        };

        let (x, y) = depot_regex
            .captures(data)
            .and_then(|caps| {
                let x = caps.get(1)?.as_str().parse::<f64>().ok()?;
                let y = caps.get(2)?.as_str().parse::<f64>().ok()?;
                Some((x, y))
            })
            .ok_or(InvalidInstance::MissingField("depot coordinates"))?;

        let mut customers = vec![Customer::depot(x, y)];
        for caps in customers_regex.captures_iter(data) {
            let field = |i: usize| caps.get(i).map(|m| m.as_str());
            let number = |i: usize| -> Result<f64, Box<dyn Error>> {
                Ok(ExpectedValue::cast(field(i).map(str::to_string))?.parse::<f64>()?)
            };

            customers.push(Customer {
                x: number(1)?,
                y: number(2)?,
                dronable: field(3) == Some("1"),
                demand: number(4)?,
                truck_service_time: if field(5).is_some() { number(5)? } else { 0.0 },
                drone_service_time: if field(6).is_some() { number(6)? } else { 0.0 },
            });
        }

        if let Some(declared) = _capture::<usize>(&customers_count_regex, data)
            && declared != customers.len() - 1
        {
            return Err(InvalidInstance::CustomerCountMismatch {
                declared,
                found: customers.len() - 1,
            }
            .into());
        }

        Ok((customers, trucks_count, drones_count, model))
    }

    pub fn distances(&self, kind: VehicleKind) -> &[Vec<f64>] {
        match kind {
            VehicleKind::Truck => &self.truck_distances,
            VehicleKind::Drone => &self.drone_distances,
        }
    }

    pub fn vehicles_count(&self, kind: VehicleKind) -> usize {
        match kind {
            VehicleKind::Truck => self.trucks_count,
            VehicleKind::Drone => self.drones_count,
        }
    }
}
